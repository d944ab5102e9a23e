use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::channel::{NotificationChannel, UpsertChannel};
use crate::models::log::{CreateLog, LogFilter, LogStatistics, NotificationLog};
use crate::models::notification::{
    ChannelKind, CreateNotification, Notification, NotificationFilter, NotificationStatus,
};
use crate::models::template::{CreateTemplate, NotificationTemplate};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence seam for the dispatch core. `PgStore` is the production
/// implementation; `MemoryStore` backs the tests.
#[async_trait]
pub trait Store: Send + Sync {
    // Notifications
    async fn create_notification(
        &self,
        create: CreateNotification,
    ) -> Result<Notification, DispatchError>;

    /// One-shot terminal transition: pending -> sent|failed. Sets sent_at,
    /// merges `metadata` into the existing bag, records the error message.
    /// Rejects a second transition on an already-finalized record.
    async fn finalize_notification(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error_message: Option<String>,
        metadata: HashMap<String, JsonValue>,
    ) -> Result<Notification, DispatchError>;

    async fn notification(&self, tenant_id: Uuid, id: Uuid)
    -> Result<Notification, DispatchError>;

    async fn notifications(
        &self,
        tenant_id: Uuid,
        filter: NotificationFilter,
    ) -> Result<Vec<Notification>, DispatchError>;

    /// Most recent unread in-app notifications for a user, newest first.
    async fn unread_in_app(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, DispatchError>;

    /// Idempotent: a second call on an already-read notification leaves
    /// read_at untouched. Errors if the notification is not owned by `user_id`.
    async fn mark_as_read(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Notification, DispatchError>;

    /// Returns the number of notifications newly marked read.
    async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64, DispatchError>;

    async fn notifications_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, DispatchError>;

    // Channels
    async fn upsert_channel(
        &self,
        tenant_id: Uuid,
        upsert: UpsertChannel,
    ) -> Result<NotificationChannel, DispatchError>;

    async fn active_channels(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<NotificationChannel>, DispatchError>;

    /// Highest-priority active channel for (tenant, kind), or None when the
    /// caller must fall back to environment-level configuration.
    async fn active_channel(
        &self,
        tenant_id: Uuid,
        kind: ChannelKind,
    ) -> Result<Option<NotificationChannel>, DispatchError>;

    async fn channel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<NotificationChannel, DispatchError>;

    async fn deactivate_channel(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DispatchError>;

    async fn delete_channel(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DispatchError>;

    // Templates
    async fn create_template(
        &self,
        tenant_id: Uuid,
        create: CreateTemplate,
    ) -> Result<NotificationTemplate, DispatchError>;

    async fn template(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<NotificationTemplate, DispatchError>;

    async fn templates(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<NotificationTemplate>, DispatchError>;

    // Logs
    async fn create_log(&self, create: CreateLog) -> Result<NotificationLog, DispatchError>;

    async fn logs(
        &self,
        tenant_id: Uuid,
        filter: LogFilter,
    ) -> Result<Vec<NotificationLog>, DispatchError>;

    async fn logs_by_notification(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<NotificationLog>, DispatchError>;

    async fn statistics(
        &self,
        tenant_id: Uuid,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<LogStatistics, DispatchError>;

    async fn health_check(&self) -> Result<(), DispatchError>;
}
