use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Waiting,
    Serving,
    Completed,
    Skipped,
    NoShow,
    Cancelled,
}

impl TokenStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Completed | TokenStatus::NoShow | TokenStatus::Cancelled)
    }

    /// Active tokens still hold the patient's place in the queue.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, target: &TokenStatus) -> bool {
        use TokenStatus::*;
        matches!(
            (self, target),
            (Waiting, Serving)
                | (Waiting, Skipped)
                | (Waiting, Cancelled)
                | (Serving, Completed)
                | (Serving, Skipped)
                | (Serving, NoShow)
                | (Skipped, Waiting)
                | (Skipped, NoShow)
                | (Skipped, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Waiting => "waiting",
            TokenStatus::Serving => "serving",
            TokenStatus::Completed => "completed",
            TokenStatus::Skipped => "skipped",
            TokenStatus::NoShow => "no_show",
            TokenStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Open,
    Paused,
    Closed,
}

impl QueueStatus {
    pub fn can_transition_to(&self, target: &QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, target),
            (Open, Paused) | (Paused, Open) | (Open, Closed) | (Paused, Closed) | (Closed, Open)
        )
    }

    pub fn accepts_patients(&self) -> bool {
        !matches!(self, QueueStatus::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Open => "open",
            QueueStatus::Paused => "paused",
            QueueStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub queue_id: Uuid,
    pub token_number: u32,
    pub status: TokenStatus,
    pub is_emergency: bool,
    pub patient: PatientInfo,
    /// User id of whoever created the token: the patient, or staff for walk-ins.
    pub booked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Ordering key within a priority class; reset when a skipped token is re-added.
    pub queued_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    pub fn public(&self) -> PublicToken {
        PublicToken {
            id: self.id,
            token_number: self.token_number,
            status: self.status,
            is_emergency: self.is_emergency,
        }
    }

    pub fn service_minutes(&self) -> Option<f64> {
        match (self.status, self.called_at, self.finished_at) {
            (TokenStatus::Completed, Some(called), Some(finished)) if finished >= called => {
                Some((finished - called).num_seconds() as f64 / 60.0)
            }
            _ => None,
        }
    }
}

/// Token as shown on public displays and the realtime feed: no patient details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicToken {
    pub id: Uuid,
    pub token_number: u32,
    pub status: TokenStatus,
    pub is_emergency: bool,
}

/// One doctor's queue for one clinic day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyQueue {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub date: NaiveDate,
    pub status: QueueStatus,
    pub next_token_number: u32,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: u32,
    pub waiting: u32,
    pub serving: u32,
    pub completed: u32,
    pub skipped: u32,
    pub no_show: u32,
    pub cancelled: u32,
    pub average_service_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueBoard {
    pub queue_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub status: QueueStatus,
    pub now_serving: Option<PublicToken>,
    /// Waiting tokens in serving order.
    pub up_next: Vec<PublicToken>,
    pub skipped: Vec<PublicToken>,
    pub stats: QueueStats,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPosition {
    pub token: PublicToken,
    pub queue_status: QueueStatus,
    /// Zero-based place among waiting tokens; `None` unless the token is waiting.
    pub position: Option<usize>,
    pub tokens_ahead: usize,
    pub estimated_wait_minutes: Option<u32>,
    pub now_serving: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEventKind {
    Snapshot,
    TokenJoined,
    TokenStatusChanged { from: TokenStatus, to: TokenStatus },
    TokenPriorityChanged { is_emergency: bool },
    QueueStatusChanged { from: QueueStatus, to: QueueStatus },
}

/// Message pushed to realtime subscribers. Carries the full public board so
/// clients can re-render without a follow-up request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(flatten)]
    pub kind: QueueEventKind,
    pub queue_id: Uuid,
    pub token: Option<PublicToken>,
    pub board: QueueBoard,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenQueueRequest {
    pub doctor_id: Uuid,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueLookupQuery {
    pub doctor_id: Uuid,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinQueueRequest {
    pub patient_name: String,
    /// Defaults to the phone number on the caller's token.
    pub phone: Option<String>,
    #[serde(default)]
    pub is_emergency: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQueueStatusRequest {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetEmergencyRequest {
    pub is_emergency: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueReportRequest {
    /// Overrides the doctor's address.
    pub to: Option<String>,
}
