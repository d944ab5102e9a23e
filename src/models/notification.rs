use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Logical delivery mechanism for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
    Whatsapp,
    Push,
    InApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

/// One logical message instance. Created pending, transitions exactly once
/// to sent or failed, never reverts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub kind: ChannelKind,
    pub title: String,
    pub content: String,
    pub recipient: String,
    pub status: NotificationStatus,
    pub template_id: Option<Uuid>,

    /// Open key/value bag. Known optional keys: channel_id, provider,
    /// provider_message_id, cost.
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,

    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub kind: ChannelKind,
    pub title: String,
    pub content: String,
    pub recipient: String,
    pub template_id: Option<Uuid>,
    pub metadata: HashMap<String, JsonValue>,
}

impl CreateNotification {
    pub fn new(
        tenant_id: Uuid,
        user_id: Uuid,
        kind: ChannelKind,
        title: String,
        content: String,
        recipient: String,
    ) -> Self {
        Self {
            tenant_id,
            user_id,
            kind,
            title,
            content,
            recipient,
            template_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_template(mut self, template_id: Uuid) -> Self {
        self.template_id = Some(template_id);
        self
    }
}

/// Filter for listing notifications within a tenant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    pub user_id: Option<Uuid>,
    pub kind: Option<ChannelKind>,
    pub status: Option<NotificationStatus>,
    pub limit: Option<i64>,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Whatsapp => "whatsapp",
            ChannelKind::Push => "push",
            ChannelKind::InApp => "in_app",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(ChannelKind::Email),
            "sms" => Some(ChannelKind::Sms),
            "whatsapp" => Some(ChannelKind::Whatsapp),
            "push" => Some(ChannelKind::Push),
            "in_app" => Some(ChannelKind::InApp),
            _ => None,
        }
    }
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NotificationStatus::Pending),
            "sent" => Some(NotificationStatus::Sent),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}
