use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value as JsonValue, json};
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::DispatchError;
use crate::gateway::{GatewayDispatcher, GatewayEvent};
use crate::models::channel::NotificationChannel;
use crate::models::log::CreateLog;
use crate::models::notification::{
    ChannelKind, CreateNotification, Notification, NotificationStatus,
};
use crate::providers::{
    AdapterCache, FcmPush, ProviderAdapter, SendOutcome, SendRequest, SmtpMailer,
};
use crate::registry::ChannelRegistry;
use crate::store::Store;

/// Optional knobs for SMS sends.
#[derive(Debug, Clone, Default)]
pub struct SmsOptions {
    pub template_id: Option<Uuid>,
    /// Pin a specific configured channel instead of resolving by priority.
    pub channel_id: Option<Uuid>,
}

/// Optional knobs for WhatsApp sends.
#[derive(Debug, Clone, Default)]
pub struct WhatsAppOptions {
    pub template_id: Option<Uuid>,
    pub channel_id: Option<Uuid>,
    /// When set, the vendor's template-parameterized path is used instead of
    /// the plain-message path.
    pub template_name: Option<String>,
    pub template_params: Vec<String>,
}

/// Where a send is routed: a tenant-configured channel, or the
/// environment-level fallback for the kind.
enum Route {
    Channel(NotificationChannel),
    Fallback { provider: String, config: JsonValue },
}

impl Route {
    fn channel_id(&self) -> Option<Uuid> {
        match self {
            Route::Channel(channel) => Some(channel.id),
            Route::Fallback { .. } => None,
        }
    }
}

/// The delivery façade: persists a pending record, routes through the
/// matching provider adapter, finalizes the record, and writes one audit log
/// entry per attempt. In-app sends additionally fan out to live sessions.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    registry: ChannelRegistry,
    adapters: AdapterCache,
    gateway: GatewayDispatcher,
    config: Config,
    mailer: OnceCell<Arc<dyn ProviderAdapter>>,
    pusher: OnceCell<Arc<dyn ProviderAdapter>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        registry: ChannelRegistry,
        gateway: GatewayDispatcher,
        config: Config,
    ) -> Self {
        Self {
            store,
            registry,
            adapters: AdapterCache::new(),
            gateway,
            config,
            mailer: OnceCell::new(),
            pusher: OnceCell::new(),
        }
    }

    pub async fn send_email(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        recipient: String,
        subject: String,
        content: String,
        template_id: Option<Uuid>,
    ) -> Result<Notification, DispatchError> {
        // Email always uses the environment-level mail configuration; fail
        // before persisting anything when it is absent.
        if self.config.smtp_host.is_none() {
            return Err(DispatchError::config(
                "no email configuration available (SMTP_HOST unset)",
            ));
        }

        let mut create = CreateNotification::new(
            tenant_id,
            user_id,
            ChannelKind::Email,
            subject.clone(),
            content.clone(),
            recipient.clone(),
        );
        if let Some(template_id) = template_id {
            create = create.with_template(template_id);
        }
        let notification = self.store.create_notification(create).await?;

        let adapter = self
            .mailer
            .get_or_try_init(|| async {
                SmtpMailer::from_env(&self.config)
                    .map(|m| Arc::new(m) as Arc<dyn ProviderAdapter>)
            })
            .await;

        let adapter = match adapter {
            Ok(adapter) => adapter.clone(),
            Err(e) => return self.fail_for_configuration(notification, None, e).await,
        };

        let request = SendRequest::new(recipient, subject, content);
        self.attempt_and_finalize(notification, adapter, request, None)
            .await
    }

    pub async fn send_sms(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        recipient: String,
        content: String,
        options: SmsOptions,
    ) -> Result<Notification, DispatchError> {
        let route = self
            .resolve_route(tenant_id, ChannelKind::Sms, options.channel_id)
            .await?;

        let mut create = CreateNotification::new(
            tenant_id,
            user_id,
            ChannelKind::Sms,
            content.chars().take(40).collect(),
            content.clone(),
            recipient.clone(),
        );
        if let Some(template_id) = options.template_id {
            create = create.with_template(template_id);
        }
        let notification = self.store.create_notification(create).await?;

        let channel_id = route.channel_id();
        let adapter = match self.adapter_for_route(&route).await {
            Ok(adapter) => adapter,
            Err(e) => {
                return self
                    .fail_for_configuration(notification, channel_id, e)
                    .await;
            }
        };

        let request = SendRequest::new(recipient, String::new(), content);
        self.attempt_and_finalize(notification, adapter, request, channel_id)
            .await
    }

    pub async fn send_whatsapp(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        recipient: String,
        message: String,
        options: WhatsAppOptions,
    ) -> Result<Notification, DispatchError> {
        let route = self
            .resolve_route(tenant_id, ChannelKind::Whatsapp, options.channel_id)
            .await?;

        let mut create = CreateNotification::new(
            tenant_id,
            user_id,
            ChannelKind::Whatsapp,
            message.chars().take(40).collect(),
            message.clone(),
            recipient.clone(),
        );
        if let Some(template_id) = options.template_id {
            create = create.with_template(template_id);
        }
        let notification = self.store.create_notification(create).await?;

        let channel_id = route.channel_id();
        let adapter = match self.adapter_for_route(&route).await {
            Ok(adapter) => adapter,
            Err(e) => {
                return self
                    .fail_for_configuration(notification, channel_id, e)
                    .await;
            }
        };

        let mut request = SendRequest::new(recipient, String::new(), message);
        if let Some(template_name) = options.template_name {
            request = request.with_template(template_name, options.template_params);
        }

        self.attempt_and_finalize(notification, adapter, request, channel_id)
            .await
    }

    pub async fn send_push(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        device_token: String,
        title: String,
        content: String,
        template_id: Option<Uuid>,
    ) -> Result<Notification, DispatchError> {
        if self.config.fcm_project_id.is_none() {
            return Err(DispatchError::config(
                "no push configuration available (FCM_PROJECT_ID unset)",
            ));
        }

        let mut create = CreateNotification::new(
            tenant_id,
            user_id,
            ChannelKind::Push,
            title.clone(),
            content.clone(),
            device_token.clone(),
        );
        if let Some(template_id) = template_id {
            create = create.with_template(template_id);
        }
        let notification = self.store.create_notification(create).await?;

        let adapter = self
            .pusher
            .get_or_try_init(|| async {
                FcmPush::from_env(&self.config).map(|p| Arc::new(p) as Arc<dyn ProviderAdapter>)
            })
            .await;

        let adapter = match adapter {
            Ok(adapter) => adapter.clone(),
            Err(e) => return self.fail_for_configuration(notification, None, e).await,
        };

        let request = SendRequest::new(device_token, title, content);
        self.attempt_and_finalize(notification, adapter, request, None)
            .await
    }

    /// In-app delivery is writing the record; it is immediately sent and is
    /// the only path that feeds the realtime gateway.
    pub async fn send_in_app(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        title: String,
        content: String,
        template_id: Option<Uuid>,
    ) -> Result<Notification, DispatchError> {
        let mut create = CreateNotification::new(
            tenant_id,
            user_id,
            ChannelKind::InApp,
            title,
            content,
            user_id.to_string(),
        );
        if let Some(template_id) = template_id {
            create = create.with_template(template_id);
        }
        let notification = self.store.create_notification(create).await?;

        let notification = self
            .store
            .finalize_notification(
                notification.id,
                NotificationStatus::Sent,
                None,
                HashMap::new(),
            )
            .await?;

        let log = CreateLog::new(
            notification.id,
            tenant_id,
            ChannelKind::InApp,
            NotificationStatus::Sent,
            notification.recipient.clone(),
            notification.content.clone(),
        );
        if let Err(log_err) = self.store.create_log(log).await {
            warn!(error = %log_err, "Failed to write delivery log");
        }

        self.gateway
            .send_to_user(
                user_id,
                GatewayEvent::Notification {
                    notification: notification.clone(),
                },
            )
            .await;

        info!(
            notification_id = %notification.id,
            tenant_id = %tenant_id,
            user_id = %user_id,
            "In-app notification delivered"
        );

        Ok(notification)
    }

    /// Load a template, substitute the caller's variables into subject and
    /// content, then dispatch through the channel matching the template kind.
    pub async fn send_from_template(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        template_id: Uuid,
        recipient: String,
        variables: HashMap<String, JsonValue>,
    ) -> Result<Notification, DispatchError> {
        let template = self.store.template(tenant_id, template_id).await?;
        if !template.is_active {
            return Err(DispatchError::config(format!(
                "template '{}' is inactive",
                template.name
            )));
        }

        let rendered = template.render(&variables);

        match template.kind {
            ChannelKind::Email => {
                self.send_email(
                    tenant_id,
                    user_id,
                    recipient,
                    rendered.subject,
                    rendered.content,
                    Some(template_id),
                )
                .await
            }
            ChannelKind::Sms => {
                self.send_sms(
                    tenant_id,
                    user_id,
                    recipient,
                    rendered.content,
                    SmsOptions {
                        template_id: Some(template_id),
                        channel_id: None,
                    },
                )
                .await
            }
            ChannelKind::Whatsapp => {
                self.send_whatsapp(
                    tenant_id,
                    user_id,
                    recipient,
                    rendered.content,
                    WhatsAppOptions {
                        template_id: Some(template_id),
                        ..Default::default()
                    },
                )
                .await
            }
            ChannelKind::Push => {
                self.send_push(
                    tenant_id,
                    user_id,
                    recipient,
                    rendered.subject,
                    rendered.content,
                    Some(template_id),
                )
                .await
            }
            ChannelKind::InApp => {
                self.send_in_app(
                    tenant_id,
                    user_id,
                    rendered.subject,
                    rendered.content,
                    Some(template_id),
                )
                .await
            }
        }
    }

    /// Channel selection for SMS/WhatsApp: pinned channel, else the
    /// registry's priority resolution, else the environment fallback. With
    /// nothing configured anywhere the send fails before any record exists.
    async fn resolve_route(
        &self,
        tenant_id: Uuid,
        kind: ChannelKind,
        pinned: Option<Uuid>,
    ) -> Result<Route, DispatchError> {
        if let Some(channel_id) = pinned {
            let channel = self.registry.channel(tenant_id, channel_id).await?;
            if channel.kind != kind {
                return Err(DispatchError::config(format!(
                    "channel '{}' is a {} channel, not {}",
                    channel.name, channel.kind, kind
                )));
            }
            if !channel.is_active {
                return Err(DispatchError::config(format!(
                    "channel '{}' is not active",
                    channel.name
                )));
            }
            return Ok(Route::Channel(channel));
        }

        if let Some(channel) = self.registry.active_channel(tenant_id, kind).await? {
            return Ok(Route::Channel(channel));
        }

        let (provider, raw) = match kind {
            ChannelKind::Sms => (
                &self.config.sms_fallback_provider,
                &self.config.sms_fallback_config,
            ),
            ChannelKind::Whatsapp => (
                &self.config.whatsapp_fallback_provider,
                &self.config.whatsapp_fallback_config,
            ),
            _ => (&None, &None),
        };

        if let Some(provider) = provider {
            let config = self
                .config
                .fallback_config(raw)
                .map_err(|e| DispatchError::config(e.to_string()))?
                .unwrap_or_else(|| json!({}));
            return Ok(Route::Fallback {
                provider: provider.clone(),
                config,
            });
        }

        Err(DispatchError::config(format!(
            "no {} channel configured for tenant and no global fallback",
            kind
        )))
    }

    async fn adapter_for_route(
        &self,
        route: &Route,
    ) -> Result<Arc<dyn ProviderAdapter>, DispatchError> {
        match route {
            Route::Channel(channel) => self.adapters.adapter_for(channel).await,
            Route::Fallback { provider, config } => {
                let kind = match provider.as_str() {
                    "wablas" | "meta_cloud" => ChannelKind::Whatsapp,
                    _ => ChannelKind::Sms,
                };
                self.adapters.fallback_adapter(kind, provider, config).await
            }
        }
    }

    /// Phases two and three of a send: bounded provider call, terminal
    /// status transition, one log entry covering the attempt.
    async fn attempt_and_finalize(
        &self,
        notification: Notification,
        adapter: Arc<dyn ProviderAdapter>,
        request: SendRequest,
        channel_id: Option<Uuid>,
    ) -> Result<Notification, DispatchError> {
        let deadline = Duration::from_secs(self.config.provider_timeout_seconds);

        let outcome = match timeout(deadline, adapter.send(&request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                // Configuration errors propagate, but the record is still
                // finalized and the failure logged first.
                return self
                    .fail_for_configuration(notification, channel_id, e)
                    .await;
            }
            Err(_) => SendOutcome::failed(
                adapter.provider(),
                format!("provider call exceeded {}s timeout", deadline.as_secs()),
            ),
        };

        let status = if outcome.success {
            NotificationStatus::Sent
        } else {
            NotificationStatus::Failed
        };

        let mut metadata = HashMap::new();
        metadata.insert("provider".to_string(), json!(outcome.provider));
        if let Some(channel_id) = channel_id {
            metadata.insert("channel_id".to_string(), json!(channel_id));
        }
        if let Some(id) = &outcome.provider_message_id {
            metadata.insert("provider_message_id".to_string(), json!(id));
        }
        if let Some(cost) = outcome.cost {
            metadata.insert("cost".to_string(), json!(cost));
        }

        let finalized = self
            .store
            .finalize_notification(notification.id, status, outcome.error.clone(), metadata)
            .await?;

        let mut log = CreateLog::new(
            finalized.id,
            finalized.tenant_id,
            finalized.kind,
            status,
            finalized.recipient.clone(),
            finalized.content.clone(),
        )
        .with_provider(outcome.provider.clone())
        .with_request(json!({
            "recipient": request.recipient,
            "title": request.title,
            "template_name": request.template_name,
        }))
        .with_response(json!({
            "success": outcome.success,
            "provider_message_id": outcome.provider_message_id,
            "cost": outcome.cost,
            "error": outcome.error,
        }));

        if let Some(channel_id) = channel_id {
            log = log.with_channel(channel_id);
        }
        if let Some(id) = outcome.provider_message_id {
            log = log.with_provider_message_id(id);
        }
        if let Some(cost) = outcome.cost {
            log = log.with_cost(cost);
        }
        if let Some(error) = outcome.error {
            log = log.with_error(error);
        }

        if let Err(log_err) = self.store.create_log(log).await {
            warn!(error = %log_err, "Failed to write delivery log");
        }

        info!(
            notification_id = %finalized.id,
            tenant_id = %finalized.tenant_id,
            kind = %finalized.kind,
            status = %status,
            provider = %outcome.provider,
            "Delivery attempt finalized"
        );

        Ok(finalized)
    }

    /// A configuration error discovered after the pending record exists:
    /// finalize the record as failed, log the failure without pretending a
    /// network attempt happened, and propagate the error to the caller.
    async fn fail_for_configuration(
        &self,
        notification: Notification,
        channel_id: Option<Uuid>,
        error: DispatchError,
    ) -> Result<Notification, DispatchError> {
        let message = error.to_string();

        let mut metadata = HashMap::new();
        if let Some(channel_id) = channel_id {
            metadata.insert("channel_id".to_string(), json!(channel_id));
        }

        if let Err(finalize_err) = self
            .store
            .finalize_notification(
                notification.id,
                NotificationStatus::Failed,
                Some(message.clone()),
                metadata,
            )
            .await
        {
            warn!(
                notification_id = %notification.id,
                error = %finalize_err,
                "Failed to finalize notification after configuration error"
            );
        }

        let mut log = CreateLog::new(
            notification.id,
            notification.tenant_id,
            notification.kind,
            NotificationStatus::Failed,
            notification.recipient.clone(),
            notification.content.clone(),
        )
        .with_error(message);

        if let Some(channel_id) = channel_id {
            log = log.with_channel(channel_id);
        }

        if let Err(log_err) = self.store.create_log(log).await {
            warn!(error = %log_err, "Failed to write delivery log");
        }

        Err(error)
    }
}
