use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

fn default_provider_timeout() -> u64 {
    15
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_port: u16,

    /// Upper bound on a single provider call; a timed-out call is finalized
    /// as a failed delivery.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: u64,

    // Global email configuration (always environment-level; email has no
    // per-tenant channel override).
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,

    // Global push configuration (FCM, environment-level only).
    pub fcm_project_id: Option<String>,

    // Environment-level fallbacks for SMS/WhatsApp, used only when a tenant
    // has no configured channel of that kind.
    pub sms_fallback_provider: Option<String>,
    pub sms_fallback_config: Option<String>,
    pub whatsapp_fallback_provider: Option<String>,
    pub whatsapp_fallback_config: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|_| anyhow!("Invalid or missing environmental variable"))?;
        Ok(config)
    }

    /// Parsed fallback config blob for a channel kind, if one is set.
    pub fn fallback_config(&self, raw: &Option<String>) -> Result<Option<serde_json::Value>> {
        match raw {
            None => Ok(None),
            Some(raw) => {
                let value = serde_json::from_str(raw)
                    .map_err(|e| anyhow!("Invalid fallback channel config: {}", e))?;
                Ok(Some(value))
            }
        }
    }
}
