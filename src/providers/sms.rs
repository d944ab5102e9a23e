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
// Twilio
// ---------------------------------------------------------------------------

pub struct TwilioSms {
    http_client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    sender: String,
}

#[derive(Debug, Deserialize)]
struct TwilioResponse {
    sid: Option<String>,
    price: Option<String>,
    message: Option<String>,
}

impl TwilioSms {
    pub fn from_config(
        config: &serde_json::Value,
        http_client: &Client,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            http_client: http_client.clone(),
            base_url: base_url(config, "https://api.twilio.com"),
            account_sid: config_str(config, "account_sid")?,
            auth_token: config_str(config, "auth_token")?,
            sender: config_str(config, "sender")?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for TwilioSms {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, DispatchError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        debug!(recipient = %request.recipient, "Sending SMS via Twilio");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", request.recipient.as_str()),
                ("From", self.sender.as_str()),
                ("Body", request.content.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        let status = response.status();
        let body: TwilioResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        if !status.is_success() {
            let reason = body
                .message
                .unwrap_or_else(|| format!("Twilio returned status {}", status));
            return Ok(SendOutcome::failed(self.provider(), reason));
        }

        let mut outcome = SendOutcome::sent(self.provider());
        if let Some(sid) = body.sid {
            outcome = outcome.with_message_id(sid);
        }
        if let Some(cost) = body.price.and_then(|p| p.parse::<f64>().ok()) {
            outcome = outcome.with_cost(cost.abs());
        }

        Ok(outcome)
    }

    fn provider(&self) -> &'static str {
        "twilio"
    }
}

// ---------------------------------------------------------------------------
// Vonage
// ---------------------------------------------------------------------------

pub struct VonageSms {
    http_client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    sender: String,
}

#[derive(Debug, Deserialize)]
struct VonageResponse {
    messages: Vec<VonageMessage>,
}

#[derive(Debug, Deserialize)]
struct VonageMessage {
    status: String,

    #[serde(rename = "message-id")]
    message_id: Option<String>,

    #[serde(rename = "message-price")]
    message_price: Option<String>,

    #[serde(rename = "error-text")]
    error_text: Option<String>,
}

impl VonageSms {
    pub fn from_config(
        config: &serde_json::Value,
        http_client: &Client,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            http_client: http_client.clone(),
            base_url: base_url(config, "https://rest.nexmo.com"),
            api_key: config_str(config, "api_key")?,
            api_secret: config_str(config, "api_secret")?,
            sender: config_str(config, "sender")?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for VonageSms {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, DispatchError> {
        let url = format!("{}/sms/json", self.base_url);

        debug!(recipient = %request.recipient, "Sending SMS via Vonage");

        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({
                "api_key": self.api_key,
                "api_secret": self.api_secret,
                "from": self.sender,
                "to": request.recipient,
                "text": request.content,
            }))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        let body: VonageResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        let Some(message) = body.messages.into_iter().next() else {
            return Ok(SendOutcome::failed(
                self.provider(),
                "Vonage returned no message entries".to_string(),
            ));
        };

        // Vonage reports per-message status; "0" means accepted.
        if message.status != "0" {
            let reason = message
                .error_text
                .unwrap_or_else(|| format!("Vonage status {}", message.status));
            return Ok(SendOutcome::failed(self.provider(), reason));
        }

        let mut outcome = SendOutcome::sent(self.provider());
        if let Some(id) = message.message_id {
            outcome = outcome.with_message_id(id);
        }
        if let Some(cost) = message.message_price.and_then(|p| p.parse::<f64>().ok()) {
            outcome = outcome.with_cost(cost);
        }

        Ok(outcome)
    }

    fn provider(&self) -> &'static str {
        "vonage"
    }
}

// ---------------------------------------------------------------------------
// Zenziva
// ---------------------------------------------------------------------------

pub struct ZenzivaSms {
    http_client: Client,
    base_url: String,
    user_key: String,
    pass_key: String,
}

#[derive(Debug, Deserialize)]
struct ZenzivaResponse {
    #[serde(rename = "messageId")]
    message_id: Option<String>,
    status: Option<String>,
    text: Option<String>,
}

impl ZenzivaSms {
    pub fn from_config(
        config: &serde_json::Value,
        http_client: &Client,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            http_client: http_client.clone(),
            base_url: base_url(config, "https://console.zenziva.net"),
            user_key: config_str(config, "user_key")?,
            pass_key: config_str(config, "pass_key")?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for ZenzivaSms {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, DispatchError> {
        let url = format!("{}/reguler/api/sendsms/", self.base_url);

        debug!(recipient = %request.recipient, "Sending SMS via Zenziva");

        let response = self
            .http_client
            .post(&url)
            .form(&[
                ("userkey", self.user_key.as_str()),
                ("passkey", self.pass_key.as_str()),
                ("to", request.recipient.as_str()),
                ("message", request.content.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        let body: ZenzivaResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        // Zenziva signals success with status "1".
        if body.status.as_deref() != Some("1") {
            let reason = body
                .text
                .unwrap_or_else(|| "Zenziva rejected the message".to_string());
            return Ok(SendOutcome::failed(self.provider(), reason));
        }

        let mut outcome = SendOutcome::sent(self.provider());
        if let Some(id) = body.message_id {
            outcome = outcome.with_message_id(id);
        }

        Ok(outcome)
    }

    fn provider(&self) -> &'static str {
        "zenziva"
    }
}
