use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::notification::{ChannelKind, NotificationStatus};

/// Append-only record of one delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub tenant_id: Uuid,
    pub kind: ChannelKind,
    pub status: NotificationStatus,
    pub channel_id: Option<Uuid>,
    pub recipient: String,
    pub message: String,
    pub request_data: Option<JsonValue>,
    pub response_data: Option<JsonValue>,
    pub error_message: Option<String>,
    pub provider_message_id: Option<String>,
    pub cost: Option<f64>,
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateLog {
    pub notification_id: Uuid,
    pub tenant_id: Uuid,
    pub kind: ChannelKind,
    pub status: NotificationStatus,
    pub channel_id: Option<Uuid>,
    pub recipient: String,
    pub message: String,
    pub request_data: Option<JsonValue>,
    pub response_data: Option<JsonValue>,
    pub error_message: Option<String>,
    pub provider_message_id: Option<String>,
    pub cost: Option<f64>,
    pub provider: Option<String>,
}

impl CreateLog {
    pub fn new(
        notification_id: Uuid,
        tenant_id: Uuid,
        kind: ChannelKind,
        status: NotificationStatus,
        recipient: String,
        message: String,
    ) -> Self {
        Self {
            notification_id,
            tenant_id,
            kind,
            status,
            channel_id: None,
            recipient,
            message,
            request_data: None,
            response_data: None,
            error_message: None,
            provider_message_id: None,
            cost: None,
            provider: None,
        }
    }

    pub fn with_channel(mut self, channel_id: Uuid) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn with_request(mut self, request: JsonValue) -> Self {
        self.request_data = Some(request);
        self
    }

    pub fn with_response(mut self, response: JsonValue) -> Self {
        self.response_data = Some(response);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error_message = Some(error);
        self
    }

    pub fn with_provider(mut self, provider: String) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_provider_message_id(mut self, id: String) -> Self {
        self.provider_message_id = Some(id);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Filter for the log listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub kind: Option<ChannelKind>,
    pub status: Option<NotificationStatus>,
    pub channel_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Attempt counts within a window, grouped by outcome and by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStatistics {
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub by_kind: HashMap<String, u64>,
    pub total_cost: f64,
}
