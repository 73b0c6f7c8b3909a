use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAttachment {
    pub filename: String,
    /// Base64 encoded file content.
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub html: String,
    #[serde(default)]
    pub attachment: Option<EmailAttachment>,
}

/// Outbound message as handed to a transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<EmailAttachment>,
}

/// Result object returned to callers instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl EmailResult {
    pub fn sent(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message: "Email sent successfully".to_string(),
            message_id,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            message_id: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email transport is not configured")]
    NotConfigured,

    #[error("Mail relay rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Mail relay unreachable: {0}")]
    Http(#[from] reqwest::Error),
}
