use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::DispatchError;
use crate::providers::{ProviderAdapter, SendOutcome, SendRequest};

fn config_str(config: &serde_json::Value, key: &str) -> Result<String, DispatchError> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| DispatchError::config(format!("missing '{}' in channel config", key)))
}

fn base_url(config: &serde_json::Value, default: &str) -> String {
    config
        .get("base_url")
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

// ---------------------------------------------------------------------------
// Wablas (plain messages only)
// ---------------------------------------------------------------------------

pub struct WablasWhatsApp {
    http_client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct WablasResponse {
    status: bool,
    message: Option<String>,
}

impl WablasWhatsApp {
    pub fn from_config(
        config: &serde_json::Value,
        http_client: &Client,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            http_client: http_client.clone(),
            base_url: base_url(config, "https://console.wablas.com"),
            token: config_str(config, "token")?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for WablasWhatsApp {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, DispatchError> {
        let url = format!("{}/api/send-message", self.base_url);

        debug!(recipient = %request.recipient, "Sending WhatsApp message via Wablas");

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &self.token)
            .form(&[
                ("phone", request.recipient.as_str()),
                ("message", request.content.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        let body: WablasResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        if !body.status {
            let reason = body
                .message
                .unwrap_or_else(|| "Wablas rejected the message".to_string());
            return Ok(SendOutcome::failed(self.provider(), reason));
        }

        Ok(SendOutcome::sent(self.provider()))
    }

    fn provider(&self) -> &'static str {
        "wablas"
    }
}

// ---------------------------------------------------------------------------
// Meta Cloud API (plain and template-parameterized messages)
// ---------------------------------------------------------------------------

pub struct MetaCloudWhatsApp {
    http_client: Client,
    base_url: String,
    phone_number_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MetaCloudResponse {
    messages: Option<Vec<MetaCloudMessage>>,
    error: Option<MetaCloudError>,
}

#[derive(Debug, Deserialize)]
struct MetaCloudMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MetaCloudError {
    message: String,
}

impl MetaCloudWhatsApp {
    pub fn from_config(
        config: &serde_json::Value,
        http_client: &Client,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            http_client: http_client.clone(),
            base_url: base_url(config, "https://graph.facebook.com"),
            phone_number_id: config_str(config, "phone_number_id")?,
            access_token: config_str(config, "access_token")?,
        })
    }

    fn payload(&self, request: &SendRequest) -> serde_json::Value {
        match &request.template_name {
            Some(template_name) => {
                let parameters: Vec<serde_json::Value> = request
                    .template_params
                    .iter()
                    .map(|p| serde_json::json!({ "type": "text", "text": p }))
                    .collect();

                serde_json::json!({
                    "messaging_product": "whatsapp",
                    "to": request.recipient,
                    "type": "template",
                    "template": {
                        "name": template_name,
                        "language": { "code": "id" },
                        "components": [
                            { "type": "body", "parameters": parameters }
                        ]
                    }
                })
            }
            None => serde_json::json!({
                "messaging_product": "whatsapp",
                "to": request.recipient,
                "type": "text",
                "text": { "body": request.content }
            }),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MetaCloudWhatsApp {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, DispatchError> {
        let url = format!("{}/v17.0/{}/messages", self.base_url, self.phone_number_id);

        debug!(
            recipient = %request.recipient,
            template = request.template_name.as_deref().unwrap_or(""),
            "Sending WhatsApp message via Meta Cloud API"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&self.payload(request))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        let body: MetaCloudResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        if let Some(error) = body.error {
            return Ok(SendOutcome::failed(self.provider(), error.message));
        }

        let mut outcome = SendOutcome::sent(self.provider());
        if let Some(id) = body.messages.and_then(|m| m.into_iter().next()) {
            outcome = outcome.with_message_id(id.id);
        }

        Ok(outcome)
    }

    fn provider(&self) -> &'static str {
        "meta_cloud"
    }
}
