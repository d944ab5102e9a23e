use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::DispatchError;
use crate::providers::{ProviderAdapter, SendOutcome, SendRequest};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

#[derive(Debug, Clone, Serialize)]
struct FcmRequest {
    message: FcmMessage,
}

#[derive(Debug, Clone, Serialize)]
struct FcmMessage {
    token: String,
    notification: FcmNotification,

    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
struct FcmNotification {
    title: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: Option<String>,
}

/// Token-addressed push sender for the FCM v1 API. Always bound to the
/// environment-level project configuration.
pub struct FcmPush {
    http_client: Client,
    project_id: String,
    base_url: String,
}

impl FcmPush {
    pub fn from_env(config: &Config) -> Result<Self, DispatchError> {
        let project_id = config
            .fcm_project_id
            .clone()
            .ok_or_else(|| DispatchError::config("FCM_PROJECT_ID is not configured"))?;

        Ok(Self {
            http_client: Client::new(),
            project_id,
            base_url: "https://fcm.googleapis.com".to_string(),
        })
    }

    fn validate_token(token: &str) -> Result<(), String> {
        if token.is_empty() {
            return Err("Device token cannot be empty".to_string());
        }
        if token.len() < 20 {
            return Err("Device token too short (minimum 20 characters)".to_string());
        }
        if token.len() > 200 {
            return Err("Device token too long (maximum 200 characters)".to_string());
        }

        let valid_chars = token
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

        if !valid_chars {
            return Err("Device token contains invalid characters".to_string());
        }

        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for FcmPush {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, DispatchError> {
        if let Err(reason) = Self::validate_token(&request.recipient) {
            return Ok(SendOutcome::failed(self.provider(), reason));
        }

        // Missing service-account credentials are a configuration problem
        // and must propagate, unlike delivery failures below.
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| DispatchError::config(format!("GCP credentials unavailable: {}", e)))?;
        let token = provider
            .token(FCM_SCOPES)
            .await
            .map_err(|e| DispatchError::config(format!("GCP token fetch failed: {}", e)))?;

        let payload = FcmRequest {
            message: FcmMessage {
                token: request.recipient.clone(),
                notification: FcmNotification {
                    title: request.title.clone(),
                    body: request.content.clone(),
                },
                data: None,
            },
        };

        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.project_id
        );

        debug!(project_id = %self.project_id, "Sending FCM push notification");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.as_str())
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("unreadable FCM error body: {}", e));
            return Ok(SendOutcome::failed(
                self.provider(),
                format!("FCM request failed: {}", error_text),
            ));
        }

        let body: FcmResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => return Ok(SendOutcome::failed(self.provider(), e.to_string())),
        };

        let mut outcome = SendOutcome::sent(self.provider());
        if let Some(name) = body.name {
            outcome = outcome.with_message_id(name);
        }

        Ok(outcome)
    }

    fn provider(&self) -> &'static str {
        "fcm"
    }
}
