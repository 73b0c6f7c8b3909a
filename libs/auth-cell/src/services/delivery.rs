use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use shared_utils::validation::mask_phone;

use crate::error::OtpError;

/// Channel a one-time code is sent through.
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), OtpError>;
}

/// SMS gateway taking `POST {base}/messages` with a bearer key.
pub struct HttpSmsDelivery {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpSmsDelivery {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl OtpDelivery for HttpSmsDelivery {
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), OtpError> {
        let url = format!("{}/messages", self.base_url);
        debug!("Sending verification code to {} via {}", mask_phone(phone), url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "to": phone,
                "message": format!("{} is your clinic verification code", code)
            }))
            .send()
            .await
            .map_err(|e| OtpError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OtpError::Delivery(format!("SMS gateway returned {}: {}", status, body)));
        }

        Ok(())
    }
}

/// Development delivery used when no SMS gateway is configured: the code
/// only goes to the log.
pub struct LogOtpDelivery;

#[async_trait]
impl OtpDelivery for LogOtpDelivery {
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), OtpError> {
        warn!("SMS gateway not configured; verification code for {} is {}", mask_phone(phone), code);
        Ok(())
    }
}
