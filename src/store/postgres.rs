use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::channel::{NotificationChannel, UpsertChannel};
use crate::models::log::{CreateLog, LogFilter, LogStatistics, NotificationLog};
use crate::models::notification::{
    ChannelKind, CreateNotification, Notification, NotificationFilter, NotificationStatus,
};
use crate::models::template::{CreateTemplate, NotificationTemplate};
use crate::store::Store;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, DispatchError> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_kind(raw: &str) -> Result<ChannelKind, DispatchError> {
    ChannelKind::parse(raw)
        .ok_or_else(|| DispatchError::config(format!("unknown channel kind in storage: {}", raw)))
}

fn parse_status(raw: &str) -> Result<NotificationStatus, DispatchError> {
    NotificationStatus::parse(raw).ok_or_else(|| {
        DispatchError::config(format!("unknown notification status in storage: {}", raw))
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, DispatchError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let metadata: JsonValue = row.try_get("metadata")?;

    Ok(Notification {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        kind: parse_kind(&kind)?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        recipient: row.try_get("recipient")?,
        status: parse_status(&status)?,
        template_id: row.try_get("template_id")?,
        metadata: serde_json::from_value(metadata)?,
        sent_at: row.try_get("sent_at")?,
        read_at: row.try_get("read_at")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

fn channel_from_row(row: &PgRow) -> Result<NotificationChannel, DispatchError> {
    let kind: String = row.try_get("kind")?;

    Ok(NotificationChannel {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        kind: parse_kind(&kind)?,
        provider: row.try_get("provider")?,
        config: row.try_get("config")?,
        is_active: row.try_get("is_active")?,
        is_default: row.try_get("is_default")?,
        priority: row.try_get("priority")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn template_from_row(row: &PgRow) -> Result<NotificationTemplate, DispatchError> {
    let kind: String = row.try_get("kind")?;
    let variables: JsonValue = row.try_get("variables")?;

    Ok(NotificationTemplate {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        kind: parse_kind(&kind)?,
        subject: row.try_get("subject")?,
        content: row.try_get("content")?,
        variables: serde_json::from_value(variables)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn log_from_row(row: &PgRow) -> Result<NotificationLog, DispatchError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;

    Ok(NotificationLog {
        id: row.try_get("id")?,
        notification_id: row.try_get("notification_id")?,
        tenant_id: row.try_get("tenant_id")?,
        kind: parse_kind(&kind)?,
        status: parse_status(&status)?,
        channel_id: row.try_get("channel_id")?,
        recipient: row.try_get("recipient")?,
        message: row.try_get("message")?,
        request_data: row.try_get("request_data")?,
        response_data: row.try_get("response_data")?,
        error_message: row.try_get("error_message")?,
        provider_message_id: row.try_get("provider_message_id")?,
        cost: row.try_get("cost")?,
        provider: row.try_get("provider")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_notification(
        &self,
        create: CreateNotification,
    ) -> Result<Notification, DispatchError> {
        let metadata = serde_json::to_value(&create.metadata)?;

        let row = sqlx::query(
            r#"
            INSERT INTO notifications
                (id, tenant_id, user_id, kind, title, content, recipient,
                 status, template_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(create.tenant_id)
        .bind(create.user_id)
        .bind(create.kind.as_str())
        .bind(&create.title)
        .bind(&create.content)
        .bind(&create.recipient)
        .bind(create.template_id)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;

        notification_from_row(&row)
    }

    async fn finalize_notification(
        &self,
        id: Uuid,
        status: NotificationStatus,
        error_message: Option<String>,
        metadata: HashMap<String, JsonValue>,
    ) -> Result<Notification, DispatchError> {
        let patch = serde_json::to_value(&metadata)?;

        // The status guard makes the pending -> terminal transition one-shot.
        let row = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2,
                sent_at = now(),
                error_message = $3,
                metadata = metadata || $4
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error_message)
        .bind(patch)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => notification_from_row(&row),
            None => {
                error!(notification_id = %id, "Finalize rejected: record missing or not pending");
                Err(DispatchError::config(format!(
                    "notification {} already finalized or missing",
                    id
                )))
            }
        }
    }

    async fn notification(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Notification, DispatchError> {
        let row = sqlx::query("SELECT * FROM notifications WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DispatchError::not_found("notification"))?;

        notification_from_row(&row)
    }

    async fn notifications(
        &self,
        tenant_id: Uuid,
        filter: NotificationFilter,
    ) -> Result<Vec<Notification>, DispatchError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM notifications WHERE tenant_id = ");
        builder.push_bind(tenant_id);

        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(kind) = filter.kind {
            builder.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }

        builder.push(" ORDER BY created_at DESC");
        builder
            .push(" LIMIT ")
            .push_bind(filter.limit.unwrap_or(100));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn unread_in_app(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, DispatchError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND kind = 'in_app' AND read_at IS NULL
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_as_read(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Notification, DispatchError> {
        // COALESCE keeps the first read timestamp on repeat calls.
        let row = sqlx::query(
            r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, now())
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DispatchError::not_found("notification"))?;

        notification_from_row(&row)
    }

    async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64, DispatchError> {
        let result =
            sqlx::query("UPDATE notifications SET read_at = now() WHERE user_id = $1 AND read_at IS NULL")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn notifications_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, DispatchError> {
        let rows =
            sqlx::query("SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn upsert_channel(
        &self,
        tenant_id: Uuid,
        upsert: UpsertChannel,
    ) -> Result<NotificationChannel, DispatchError> {
        let row = sqlx::query(
            r#"
            INSERT INTO notification_channels
                (id, tenant_id, name, kind, provider, config, is_active,
                 is_default, priority, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now(), now())
            ON CONFLICT (tenant_id, name, kind) DO UPDATE SET
                provider = EXCLUDED.provider,
                config = EXCLUDED.config,
                is_active = EXCLUDED.is_active,
                is_default = EXCLUDED.is_default,
                priority = EXCLUDED.priority,
                description = EXCLUDED.description,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(&upsert.name)
        .bind(upsert.kind.as_str())
        .bind(&upsert.provider)
        .bind(&upsert.config)
        .bind(upsert.is_active)
        .bind(upsert.is_default)
        .bind(upsert.priority)
        .bind(&upsert.description)
        .fetch_one(&self.pool)
        .await?;

        channel_from_row(&row)
    }

    async fn active_channels(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<NotificationChannel>, DispatchError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM notification_channels
            WHERE tenant_id = $1 AND is_active = true
            ORDER BY kind, priority DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(channel_from_row).collect()
    }

    async fn active_channel(
        &self,
        tenant_id: Uuid,
        kind: ChannelKind,
    ) -> Result<Option<NotificationChannel>, DispatchError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM notification_channels
            WHERE tenant_id = $1 AND kind = $2 AND is_active = true
            ORDER BY priority DESC, id
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(channel_from_row).transpose()
    }

    async fn channel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<NotificationChannel, DispatchError> {
        let row =
            sqlx::query("SELECT * FROM notification_channels WHERE id = $1 AND tenant_id = $2")
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DispatchError::not_found("channel"))?;

        channel_from_row(&row)
    }

    async fn deactivate_channel(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DispatchError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_channels
            SET is_active = false, updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DispatchError::not_found("channel"));
        }

        Ok(())
    }

    async fn delete_channel(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DispatchError> {
        let result =
            sqlx::query("DELETE FROM notification_channels WHERE id = $1 AND tenant_id = $2")
                .bind(id)
                .bind(tenant_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DispatchError::not_found("channel"));
        }

        Ok(())
    }

    async fn create_template(
        &self,
        tenant_id: Uuid,
        create: CreateTemplate,
    ) -> Result<NotificationTemplate, DispatchError> {
        let variables = serde_json::to_value(&create.variables)?;

        let row = sqlx::query(
            r#"
            INSERT INTO notification_templates
                (id, tenant_id, name, kind, subject, content, variables,
                 is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, true, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(&create.name)
        .bind(create.kind.as_str())
        .bind(&create.subject)
        .bind(&create.content)
        .bind(variables)
        .fetch_one(&self.pool)
        .await?;

        template_from_row(&row)
    }

    async fn template(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<NotificationTemplate, DispatchError> {
        let row =
            sqlx::query("SELECT * FROM notification_templates WHERE id = $1 AND tenant_id = $2")
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DispatchError::not_found("template"))?;

        template_from_row(&row)
    }

    async fn templates(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<NotificationTemplate>, DispatchError> {
        let rows =
            sqlx::query("SELECT * FROM notification_templates WHERE tenant_id = $1 ORDER BY name")
                .bind(tenant_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(template_from_row).collect()
    }

    async fn create_log(&self, create: CreateLog) -> Result<NotificationLog, DispatchError> {
        let row = sqlx::query(
            r#"
            INSERT INTO notification_logs
                (id, notification_id, tenant_id, kind, status, channel_id,
                 recipient, message, request_data, response_data, error_message,
                 provider_message_id, cost, provider, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(create.notification_id)
        .bind(create.tenant_id)
        .bind(create.kind.as_str())
        .bind(create.status.as_str())
        .bind(create.channel_id)
        .bind(&create.recipient)
        .bind(&create.message)
        .bind(&create.request_data)
        .bind(&create.response_data)
        .bind(&create.error_message)
        .bind(&create.provider_message_id)
        .bind(create.cost)
        .bind(&create.provider)
        .fetch_one(&self.pool)
        .await?;

        log_from_row(&row)
    }

    async fn logs(
        &self,
        tenant_id: Uuid,
        filter: LogFilter,
    ) -> Result<Vec<NotificationLog>, DispatchError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM notification_logs WHERE tenant_id = ");
        builder.push_bind(tenant_id);

        if let Some(kind) = filter.kind {
            builder.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(channel_id) = filter.channel_id {
            builder.push(" AND channel_id = ").push_bind(channel_id);
        }
        if let Some(start) = filter.start_date {
            builder.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end_date {
            builder.push(" AND created_at <= ").push_bind(end);
        }

        builder.push(" ORDER BY created_at DESC");
        builder
            .push(" LIMIT ")
            .push_bind(filter.limit.unwrap_or(100));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(log_from_row).collect()
    }

    async fn logs_by_notification(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<NotificationLog>, DispatchError> {
        let rows = sqlx::query(
            "SELECT * FROM notification_logs WHERE notification_id = $1 ORDER BY created_at",
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }

    async fn statistics(
        &self,
        tenant_id: Uuid,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<LogStatistics, DispatchError> {
        let rows = sqlx::query(
            r#"
            SELECT kind, status, COUNT(*) AS count, COALESCE(SUM(cost), 0) AS cost
            FROM notification_logs
            WHERE tenant_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            GROUP BY kind, status
            "#,
        )
        .bind(tenant_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = LogStatistics {
            total: 0,
            sent: 0,
            failed: 0,
            by_kind: HashMap::new(),
            total_cost: 0.0,
        };

        for row in &rows {
            let kind: String = row.try_get("kind")?;
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            let cost: f64 = row.try_get("cost")?;

            stats.total += count as u64;
            match parse_status(&status)? {
                NotificationStatus::Sent => stats.sent += count as u64,
                NotificationStatus::Failed => stats.failed += count as u64,
                NotificationStatus::Pending => {}
            }
            *stats.by_kind.entry(kind).or_insert(0) += count as u64;
            stats.total_cost += cost;
        }

        Ok(stats)
    }

    async fn health_check(&self) -> Result<(), DispatchError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
