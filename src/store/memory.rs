use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::channel::{NotificationChannel, UpsertChannel};
use crate::models::log::{CreateLog, LogFilter, LogStatistics, NotificationLog};
use crate::models::notification::{
    ChannelKind, CreateNotification, Notification, NotificationFilter, NotificationStatus,
};
use crate::models::template::{CreateTemplate, NotificationTemplate};
use crate::store::Store;

/// In-memory store. Backs the test suite and local development; mirrors the
/// Postgres implementation's semantics exactly.
#[derive(Default)]
pub struct MemoryStore {
    notifications: RwLock<HashMap<Uuid, Notification>>,
    channels: RwLock<HashMap<Uuid, NotificationChannel>>,
    templates: RwLock<HashMap<Uuid, NotificationTemplate>>,
    logs: RwLock<Vec<NotificationLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_notification(
        &self,
        create: CreateNotification,
    ) -> Result<Notification, DispatchError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            tenant_id: create.tenant_id,
            user_id: create.user_id,
            kind: create.kind,
            title: create.title,
            content: create.content,
            recipient: create.recipient,
            status: NotificationStatus::Pending,
            template_id: create.template_id,
            metadata: create.metadata,
            sent_at: None,
            read_at: None,
            error_message: None,
            created_at: Utc::now(),
        };

        self.notifications
            .write()
            .await
            .insert(notification.id, notification.clone());

        Ok(notification)
    }

    async fn finalize_notification(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error_message: Option<String>,
        metadata: HashMap<String, JsonValue>,
    ) -> Result<Notification, DispatchError> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or_else(|| DispatchError::not_found("notification"))?;

        if notification.status != NotificationStatus::Pending {
            return Err(DispatchError::config(format!(
                "notification {} already finalized as {}",
                id, notification.status
            )));
        }

        notification.status = status;
        notification.sent_at = Some(Utc::now());
        notification.error_message = error_message;
        notification.metadata.extend(metadata);

        Ok(notification.clone())
    }

    async fn notification(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Notification, DispatchError> {
        self.notifications
            .read()
            .await
            .get(&id)
            .filter(|n| n.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| DispatchError::not_found("notification"))
    }

    async fn notifications(
        &self,
        tenant_id: Uuid,
        filter: NotificationFilter,
    ) -> Result<Vec<Notification>, DispatchError> {
        let notifications = self.notifications.read().await;

        let mut matched: Vec<Notification> = notifications
            .values()
            .filter(|n| n.tenant_id == tenant_id)
            .filter(|n| filter.user_id.is_none_or(|u| n.user_id == u))
            .filter(|n| filter.kind.is_none_or(|k| n.kind == k))
            .filter(|n| filter.status.is_none_or(|s| n.status == s))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            matched.truncate(limit.max(0) as usize);
        }

        Ok(matched)
    }

    async fn unread_in_app(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, DispatchError> {
        let notifications = self.notifications.read().await;

        let mut unread: Vec<Notification> = notifications
            .values()
            .filter(|n| {
                n.user_id == user_id && n.kind == ChannelKind::InApp && n.read_at.is_none()
            })
            .cloned()
            .collect();

        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unread.truncate(limit.max(0) as usize);

        Ok(unread)
    }

    async fn mark_as_read(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Notification, DispatchError> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&notification_id)
            .filter(|n| n.user_id == user_id)
            .ok_or_else(|| DispatchError::not_found("notification"))?;

        if notification.read_at.is_none() {
            notification.read_at = Some(Utc::now());
        }

        Ok(notification.clone())
    }

    async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64, DispatchError> {
        let mut notifications = self.notifications.write().await;
        let now = Utc::now();
        let mut updated = 0;

        for notification in notifications.values_mut() {
            if notification.user_id == user_id && notification.read_at.is_none() {
                notification.read_at = Some(now);
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn notifications_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, DispatchError> {
        let notifications = self.notifications.read().await;

        let mut matched: Vec<Notification> = notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matched)
    }

    async fn upsert_channel(
        &self,
        tenant_id: Uuid,
        upsert: UpsertChannel,
    ) -> Result<NotificationChannel, DispatchError> {
        let mut channels = self.channels.write().await;
        let now = Utc::now();

        let existing_id = channels
            .values()
            .find(|c| c.tenant_id == tenant_id && c.name == upsert.name && c.kind == upsert.kind)
            .map(|c| c.id);

        let channel = match existing_id {
            Some(id) => {
                let channel = channels.get_mut(&id).expect("existing channel id");
                channel.provider = upsert.provider;
                channel.config = upsert.config;
                channel.is_active = upsert.is_active;
                channel.is_default = upsert.is_default;
                channel.priority = upsert.priority;
                channel.description = upsert.description;
                channel.updated_at = now;
                channel.clone()
            }
            None => {
                let channel = NotificationChannel {
                    id: Uuid::new_v4(),
                    tenant_id,
                    name: upsert.name,
                    kind: upsert.kind,
                    provider: upsert.provider,
                    config: upsert.config,
                    is_active: upsert.is_active,
                    is_default: upsert.is_default,
                    priority: upsert.priority,
                    description: upsert.description,
                    created_at: now,
                    updated_at: now,
                };
                channels.insert(channel.id, channel.clone());
                channel
            }
        };

        Ok(channel)
    }

    async fn active_channels(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<NotificationChannel>, DispatchError> {
        let channels = self.channels.read().await;

        let mut matched: Vec<NotificationChannel> = channels
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.is_active)
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            a.kind
                .as_str()
                .cmp(b.kind.as_str())
                .then(b.priority.cmp(&a.priority))
        });

        Ok(matched)
    }

    async fn active_channel(
        &self,
        tenant_id: Uuid,
        kind: ChannelKind,
    ) -> Result<Option<NotificationChannel>, DispatchError> {
        let channels = self.channels.read().await;

        let mut matched: Vec<&NotificationChannel> = channels
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.kind == kind && c.is_active)
            .collect();

        // Priority first; id as a deterministic tiebreaker.
        matched.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

        Ok(matched.first().map(|c| (*c).clone()))
    }

    async fn channel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<NotificationChannel, DispatchError> {
        self.channels
            .read()
            .await
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| DispatchError::not_found("channel"))
    }

    async fn deactivate_channel(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DispatchError> {
        let mut channels = self.channels.write().await;
        let channel = channels
            .get_mut(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| DispatchError::not_found("channel"))?;

        channel.is_active = false;
        channel.updated_at = Utc::now();

        Ok(())
    }

    async fn delete_channel(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DispatchError> {
        let mut channels = self.channels.write().await;

        match channels.get(&id) {
            Some(c) if c.tenant_id == tenant_id => {
                channels.remove(&id);
                Ok(())
            }
            _ => Err(DispatchError::not_found("channel")),
        }
    }

    async fn create_template(
        &self,
        tenant_id: Uuid,
        create: CreateTemplate,
    ) -> Result<NotificationTemplate, DispatchError> {
        let template = NotificationTemplate {
            id: Uuid::new_v4(),
            tenant_id,
            name: create.name,
            kind: create.kind,
            subject: create.subject,
            content: create.content,
            variables: create.variables,
            is_active: true,
            created_at: Utc::now(),
        };

        self.templates
            .write()
            .await
            .insert(template.id, template.clone());

        Ok(template)
    }

    async fn template(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<NotificationTemplate, DispatchError> {
        self.templates
            .read()
            .await
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| DispatchError::not_found("template"))
    }

    async fn templates(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<NotificationTemplate>, DispatchError> {
        let templates = self.templates.read().await;

        let mut matched: Vec<NotificationTemplate> = templates
            .values()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect();

        matched.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(matched)
    }

    async fn create_log(&self, create: CreateLog) -> Result<NotificationLog, DispatchError> {
        let log = NotificationLog {
            id: Uuid::new_v4(),
            notification_id: create.notification_id,
            tenant_id: create.tenant_id,
            kind: create.kind,
            status: create.status,
            channel_id: create.channel_id,
            recipient: create.recipient,
            message: create.message,
            request_data: create.request_data,
            response_data: create.response_data,
            error_message: create.error_message,
            provider_message_id: create.provider_message_id,
            cost: create.cost,
            provider: create.provider,
            created_at: Utc::now(),
        };

        self.logs.write().await.push(log.clone());

        Ok(log)
    }

    async fn logs(
        &self,
        tenant_id: Uuid,
        filter: LogFilter,
    ) -> Result<Vec<NotificationLog>, DispatchError> {
        let logs = self.logs.read().await;

        let mut matched: Vec<NotificationLog> = logs
            .iter()
            .filter(|l| l.tenant_id == tenant_id)
            .filter(|l| filter.kind.is_none_or(|k| l.kind == k))
            .filter(|l| filter.status.is_none_or(|s| l.status == s))
            .filter(|l| filter.channel_id.is_none_or(|c| l.channel_id == Some(c)))
            .filter(|l| filter.start_date.is_none_or(|d| l.created_at >= d))
            .filter(|l| filter.end_date.is_none_or(|d| l.created_at <= d))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            matched.truncate(limit.max(0) as usize);
        }

        Ok(matched)
    }

    async fn logs_by_notification(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<NotificationLog>, DispatchError> {
        let logs = self.logs.read().await;

        Ok(logs
            .iter()
            .filter(|l| l.notification_id == notification_id)
            .cloned()
            .collect())
    }

    async fn statistics(
        &self,
        tenant_id: Uuid,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<LogStatistics, DispatchError> {
        let logs = self.logs.read().await;

        let mut stats = LogStatistics {
            total: 0,
            sent: 0,
            failed: 0,
            by_kind: HashMap::new(),
            total_cost: 0.0,
        };

        for log in logs.iter().filter(|l| {
            l.tenant_id == tenant_id
                && start_date.is_none_or(|d| l.created_at >= d)
                && end_date.is_none_or(|d| l.created_at <= d)
        }) {
            stats.total += 1;
            match log.status {
                NotificationStatus::Sent => stats.sent += 1,
                NotificationStatus::Failed => stats.failed += 1,
                NotificationStatus::Pending => {}
            }
            *stats.by_kind.entry(log.kind.to_string()).or_insert(0) += 1;
            stats.total_cost += log.cost.unwrap_or(0.0);
        }

        Ok(stats)
    }

    async fn health_check(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}
