use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::Notification;

pub mod auth;
pub mod connection;
pub mod dispatcher;

pub use auth::{Claims, verify_token};
pub use dispatcher::GatewayDispatcher;

/// Server-to-client gateway events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// Initial sync: the most recent unread in-app notifications.
    Notifications { notifications: Vec<Notification> },

    /// Live push of a newly created in-app notification.
    Notification { notification: Notification },

    MarkedAsRead { notification: Notification },

    AllMarkedAsRead { updated: u64 },

    Error { message: String },
}

/// Client-to-server gateway commands. Anything unparsable is answered with
/// an Error event; the connection stays up.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum GatewayCommand {
    MarkAsRead { notification_id: Uuid },
    MarkAllAsRead,
    GetNotifications,
}
