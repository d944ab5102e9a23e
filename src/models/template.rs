use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::notification::ChannelKind;

/// Reusable content with `{{variable}}` placeholders. Only declared
/// variables are substituted at send time; anything else stays verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub kind: ChannelKind,
    pub subject: String,
    pub content: String,
    pub variables: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplate {
    pub name: String,
    pub kind: ChannelKind,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Rendered subject/content pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTemplate {
    pub subject: String,
    pub content: String,
}

impl NotificationTemplate {
    /// Substitute every declared variable present in `variables` into both
    /// subject and content. Placeholders with no binding, and placeholders
    /// for undeclared names, are left as literal text.
    pub fn render(&self, variables: &HashMap<String, JsonValue>) -> RenderedTemplate {
        RenderedTemplate {
            subject: substitute(&self.subject, &self.variables, variables),
            content: substitute(&self.content, &self.variables, variables),
        }
    }
}

fn substitute(text: &str, declared: &[String], variables: &HashMap<String, JsonValue>) -> String {
    let mut result = text.to_string();

    for name in declared {
        let Some(value) = variables.get(name) else {
            continue;
        };

        let replacement = match value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            JsonValue::Null => String::new(),
            other => other.to_string(),
        };

        let placeholder = format!("{{{{{}}}}}", name);
        result = result.replace(&placeholder, &replacement);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(subject: &str, content: &str, declared: &[&str]) -> NotificationTemplate {
        NotificationTemplate {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "greeting".to_string(),
            kind: ChannelKind::Email,
            subject: subject.to_string(),
            content: content.to_string(),
            variables: declared.iter().map(|s| s.to_string()).collect(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn declared_variables_are_substituted_everywhere() {
        let t = template(
            "Hi {{name}}",
            "{{name}}, your code is {{code}}",
            &["name", "code"],
        );
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), json!("Ann"));
        vars.insert("code".to_string(), json!(42));

        let rendered = t.render(&vars);
        assert_eq!(rendered.subject, "Hi Ann");
        assert_eq!(rendered.content, "Ann, your code is 42");
    }

    #[test]
    fn missing_binding_leaves_placeholder_verbatim() {
        let t = template("Hi {{name}}", "body", &["name"]);
        let rendered = t.render(&HashMap::new());
        assert_eq!(rendered.subject, "Hi {{name}}");
    }

    #[test]
    fn undeclared_placeholder_is_never_replaced() {
        let t = template("Hi {{name}}", "secret: {{token}}", &["name"]);
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), json!("Ann"));
        vars.insert("token".to_string(), json!("leak"));

        let rendered = t.render(&vars);
        assert_eq!(rendered.content, "secret: {{token}}");
    }

    #[test]
    fn substitution_is_idempotent_once_placeholders_are_gone() {
        let t = template("Hi {{name}}", "body", &["name"]);
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), json!("Ann"));

        let first = t.render(&vars);
        let again = substitute(&first.subject, &t.variables, &vars);
        assert_eq!(again, first.subject);
    }
}
