use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::channel::NotificationChannel;
use crate::models::notification::ChannelKind;

pub mod email;
pub mod push;
pub mod sms;
pub mod whatsapp;

pub use email::SmtpMailer;
pub use push::FcmPush;
pub use sms::{TwilioSms, VonageSms, ZenzivaSms};
pub use whatsapp::{MetaCloudWhatsApp, WablasWhatsApp};

/// Generic send request handed to an adapter. The template fields are only
/// consulted by vendors with a template-parameterized message path.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub recipient: String,
    pub title: String,
    pub content: String,
    pub template_name: Option<String>,
    pub template_params: Vec<String>,
}

impl SendRequest {
    pub fn new(recipient: String, title: String, content: String) -> Self {
        Self {
            recipient,
            title,
            content,
            template_name: None,
            template_params: Vec::new(),
        }
    }

    pub fn with_template(mut self, name: String, params: Vec<String>) -> Self {
        self.template_name = Some(name);
        self.template_params = params;
        self
    }
}

/// Normalized result of one vendor call. Delivery failures land here with
/// success=false; adapters never surface them as errors.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub cost: Option<f64>,
    pub error: Option<String>,
    pub provider: String,
}

impl SendOutcome {
    pub fn sent(provider: &str) -> Self {
        Self {
            success: true,
            provider_message_id: None,
            cost: None,
            error: None,
            provider: provider.to_string(),
        }
    }

    pub fn failed(provider: &str, error: String) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            cost: None,
            error: Some(error),
            provider: provider.to_string(),
        }
    }

    pub fn with_message_id(mut self, id: String) -> Self {
        self.provider_message_id = Some(id);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// One implementation per vendor. Construction binds credentials and fails
/// with a configuration error; `send` translates the request into the vendor
/// call and normalizes the response.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, DispatchError>;

    fn provider(&self) -> &'static str;
}

/// Build the adapter for a configured channel from its provider tag and
/// config blob.
pub fn build_adapter(
    kind: ChannelKind,
    provider: &str,
    config: &serde_json::Value,
    http_client: &reqwest::Client,
) -> Result<Arc<dyn ProviderAdapter>, DispatchError> {
    let adapter: Arc<dyn ProviderAdapter> = match (kind, provider) {
        (ChannelKind::Sms, "twilio") => Arc::new(TwilioSms::from_config(config, http_client)?),
        (ChannelKind::Sms, "vonage") => Arc::new(VonageSms::from_config(config, http_client)?),
        (ChannelKind::Sms, "zenziva") => Arc::new(ZenzivaSms::from_config(config, http_client)?),
        (ChannelKind::Whatsapp, "wablas") => {
            Arc::new(WablasWhatsApp::from_config(config, http_client)?)
        }
        (ChannelKind::Whatsapp, "meta_cloud") => {
            Arc::new(MetaCloudWhatsApp::from_config(config, http_client)?)
        }
        _ => {
            return Err(DispatchError::config(format!(
                "no {} adapter registered for provider '{}'",
                kind, provider
            )));
        }
    };

    Ok(adapter)
}

/// Memoizes constructed adapters per channel id. Credential binding runs
/// once per channel; concurrent first use is safe because construction is
/// re-checked under the write lock.
#[derive(Default)]
pub struct AdapterCache {
    http_client: reqwest::Client,
    adapters: RwLock<HashMap<Uuid, Arc<dyn ProviderAdapter>>>,
}

impl AdapterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn adapter_for(
        &self,
        channel: &NotificationChannel,
    ) -> Result<Arc<dyn ProviderAdapter>, DispatchError> {
        if let Some(adapter) = self.adapters.read().await.get(&channel.id) {
            return Ok(adapter.clone());
        }

        let mut adapters = self.adapters.write().await;
        if let Some(adapter) = adapters.get(&channel.id) {
            return Ok(adapter.clone());
        }

        let adapter = build_adapter(
            channel.kind,
            &channel.provider,
            &channel.config,
            &self.http_client,
        )?;

        info!(
            channel_id = %channel.id,
            provider = %channel.provider,
            "Provider adapter initialized"
        );

        adapters.insert(channel.id, adapter.clone());
        Ok(adapter)
    }

    /// Adapter for an environment-level fallback configuration, keyed by a
    /// uuid derived from the kind so it is also constructed once.
    pub async fn fallback_adapter(
        &self,
        kind: ChannelKind,
        provider: &str,
        config: &serde_json::Value,
    ) -> Result<Arc<dyn ProviderAdapter>, DispatchError> {
        let key = Uuid::new_v5(&Uuid::NAMESPACE_OID, kind.as_str().as_bytes());

        if let Some(adapter) = self.adapters.read().await.get(&key) {
            return Ok(adapter.clone());
        }

        let mut adapters = self.adapters.write().await;
        if let Some(adapter) = adapters.get(&key) {
            return Ok(adapter.clone());
        }

        let adapter = build_adapter(kind, provider, config, &self.http_client)?;
        adapters.insert(key, adapter.clone());
        Ok(adapter)
    }
}
