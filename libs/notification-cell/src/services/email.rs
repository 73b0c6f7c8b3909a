use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;
use shared_utils::validation::is_valid_email;

use crate::models::{EmailError, EmailRequest, EmailResult, OutgoingEmail};

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn verify(&self) -> Result<(), EmailError>;

    /// Returns the relay's message id when it reports one.
    async fn send(&self, email: &OutgoingEmail) -> Result<Option<String>, EmailError>;
}

/// Transport used when no mail relay is configured; every send fails verification.
pub struct DisabledTransport;

#[async_trait]
impl EmailTransport for DisabledTransport {
    async fn verify(&self) -> Result<(), EmailError> {
        Err(EmailError::NotConfigured)
    }

    async fn send(&self, _email: &OutgoingEmail) -> Result<Option<String>, EmailError> {
        Err(EmailError::NotConfigured)
    }
}

/// JSON mail relay: `GET {base}/verify` and `POST {base}/send`, bearer authenticated.
pub struct HttpEmailTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

impl HttpEmailTransport {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, EmailError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(EmailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn verify(&self) -> Result<(), EmailError> {
        let url = format!("{}/verify", self.base_url);
        debug!("Verifying mail relay at {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Option<String>, EmailError> {
        let url = format!("{}/send", self.base_url);
        debug!("Posting email to {} via {}", email.to, url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(email)
            .send()
            .await?;

        let response = Self::check(response).await?;
        let parsed: SendResponse = response.json().await.unwrap_or(SendResponse { id: None });
        Ok(parsed.id)
    }
}

#[derive(Clone)]
pub struct EmailService {
    transport: Arc<dyn EmailTransport>,
    from: String,
}

impl EmailService {
    pub fn new(transport: Arc<dyn EmailTransport>, from: impl Into<String>) -> Self {
        Self {
            transport,
            from: from.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let transport: Arc<dyn EmailTransport> = if config.is_email_configured() {
            Arc::new(HttpEmailTransport::new(&config.email_api_url, &config.email_api_key))
        } else {
            warn!("EMAIL_API_URL / EMAIL_API_KEY not set, outgoing email is disabled");
            Arc::new(DisabledTransport)
        };
        Self::new(transport, config.email_from.clone())
    }

    /// Validates the request, verifies the transport, then sends. Never fails:
    /// every problem is reported through the returned [`EmailResult`].
    pub async fn send_email(&self, request: EmailRequest) -> EmailResult {
        if !is_valid_email(&request.to) {
            return EmailResult::failed(format!("Invalid recipient email address: {}", request.to));
        }
        if request.subject.trim().is_empty() {
            return EmailResult::failed("Email subject is required");
        }

        let mut attachments = Vec::new();
        if let Some(attachment) = request.attachment {
            if attachment.filename.trim().is_empty() {
                return EmailResult::failed("Attachment filename is required");
            }
            if BASE64.decode(attachment.content.as_bytes()).is_err() {
                return EmailResult::failed("Attachment content is not valid base64");
            }
            attachments.push(attachment);
        }

        if let Err(e) = self.transport.verify().await {
            error!("Email transport verification failed: {}", e);
            return EmailResult::failed(format!("Email transport verification failed: {}", e));
        }

        let email = OutgoingEmail {
            from: self.from.clone(),
            to: request.to,
            subject: request.subject,
            html: request.html,
            attachments,
        };

        match self.transport.send(&email).await {
            Ok(message_id) => {
                info!("Email '{}' sent to {}", email.subject, email.to);
                EmailResult::sent(message_id)
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", email.to, e);
                EmailResult::failed(format!("Failed to send email: {}", e))
            }
        }
    }
}
