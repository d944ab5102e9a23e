use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::notification::ChannelKind;

/// A configured delivery mechanism instance: kind + vendor + credentials.
/// Multiple rows may exist per (tenant, kind); resolution picks the
/// highest-priority active row at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub kind: ChannelKind,
    pub provider: String,
    /// Vendor-specific blob; may contain secrets. Known common keys:
    /// base_url, api_key, api_secret, account_sid, auth_token, sender.
    pub config: JsonValue,
    pub is_active: bool,
    pub is_default: bool,
    pub priority: i32,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create-or-update payload, keyed by (tenant, name, kind).
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub provider: String,
    pub config: JsonValue,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub is_default: bool,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl NotificationChannel {
    /// String lookup into the config blob.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}
