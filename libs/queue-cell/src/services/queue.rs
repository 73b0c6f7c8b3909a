use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use clinic_cell::models::Doctor;
use shared_config::{AppConfig, MAX_QUEUE_RETENTION_DAYS};

use crate::error::QueueError;
use crate::models::{
    DailyQueue, PatientInfo, QueueBoard, QueueEvent, QueueEventKind, QueueStats, QueueStatus, Token,
    TokenPosition, TokenStatus,
};
use crate::services::realtime::QueueEventHub;

const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Default)]
struct Registry {
    queues: HashMap<Uuid, DailyQueue>,
    by_doctor_day: HashMap<(Uuid, NaiveDate), Uuid>,
}

impl Registry {
    fn queue(&self, queue_id: Uuid) -> Result<&DailyQueue, QueueError> {
        self.queues
            .get(&queue_id)
            .ok_or_else(|| QueueError::QueueNotFound(queue_id.to_string()))
    }

    fn queue_mut(&mut self, queue_id: Uuid) -> Result<&mut DailyQueue, QueueError> {
        self.queues
            .get_mut(&queue_id)
            .ok_or_else(|| QueueError::QueueNotFound(queue_id.to_string()))
    }
}

/// Owns every daily queue. Mutations hold the registry write lock until the
/// resulting event is published, so subscribers see events in the order the
/// changes were applied.
pub struct QueueService {
    registry: RwLock<Registry>,
    hub: QueueEventHub,
    default_service_minutes: u32,
    utc_offset_minutes: i32,
    retention_days: i64,
}

impl QueueService {
    pub fn new(hub: QueueEventHub, default_service_minutes: u32, utc_offset_minutes: i32, retention_days: i64) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            hub,
            default_service_minutes,
            utc_offset_minutes: utc_offset_minutes.clamp(-MAX_UTC_OFFSET_MINUTES, MAX_UTC_OFFSET_MINUTES),
            retention_days: retention_days.clamp(0, MAX_QUEUE_RETENTION_DAYS),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            QueueEventHub::new(),
            config.default_service_minutes,
            config.clinic_utc_offset_minutes,
            config.queue_retention_days,
        )
    }

    pub fn hub(&self) -> &QueueEventHub {
        &self.hub
    }

    /// Current date at the clinic.
    pub fn today(&self) -> NaiveDate {
        (Utc::now() + Duration::minutes(self.utc_offset_minutes as i64)).date_naive()
    }

    /// Returns the doctor's queue for the day, opening one if none exists.
    /// The flag is `true` when a new queue was created.
    pub async fn get_or_create_queue(
        &self,
        doctor: &Doctor,
        date: Option<NaiveDate>,
    ) -> Result<(DailyQueue, bool), QueueError> {
        let today = self.today();
        let date = date.unwrap_or(today);

        if date < today {
            return Err(QueueError::ValidationError(
                "Cannot open a queue for a past date".to_string(),
            ));
        }

        let mut registry = self.registry.write().await;

        if let Some(queue_id) = registry.by_doctor_day.get(&(doctor.id, date)).copied() {
            return Ok((registry.queue(queue_id)?.clone(), false));
        }

        if !doctor.is_active {
            return Err(QueueError::ValidationError(format!(
                "Doctor {} is not active",
                doctor.id
            )));
        }

        let queue = DailyQueue::new(doctor.id, doctor.clinic_id, date, Utc::now());
        registry.by_doctor_day.insert((doctor.id, date), queue.id);
        registry.queues.insert(queue.id, queue.clone());

        info!("Opened queue {} for doctor {} on {}", queue.id, doctor.id, date);
        Ok((queue, true))
    }

    pub async fn find_queue(&self, doctor_id: Uuid, date: Option<NaiveDate>) -> Option<DailyQueue> {
        let date = date.unwrap_or_else(|| self.today());
        let registry = self.registry.read().await;
        registry
            .by_doctor_day
            .get(&(doctor_id, date))
            .and_then(|id| registry.queues.get(id))
            .cloned()
    }

    pub async fn get_queue(&self, queue_id: Uuid) -> Result<DailyQueue, QueueError> {
        let registry = self.registry.read().await;
        registry.queue(queue_id).cloned()
    }

    pub async fn get_token(&self, queue_id: Uuid, token_id: Uuid) -> Result<Token, QueueError> {
        let registry = self.registry.read().await;
        registry.queue(queue_id)?.token(token_id).cloned()
    }

    pub async fn join(
        &self,
        queue_id: Uuid,
        patient: PatientInfo,
        is_emergency: bool,
        booked_by: Option<String>,
    ) -> Result<Token, QueueError> {
        let mut registry = self.registry.write().await;
        let queue = registry.queue_mut(queue_id)?;
        let now = Utc::now();

        let token = queue.join(patient, is_emergency, booked_by, now)?;

        info!(
            "Token {} issued in queue {}{}",
            token.token_number,
            queue_id,
            if is_emergency { " (emergency)" } else { "" }
        );
        self.publish(queue, QueueEventKind::TokenJoined, Some(&token), now).await;

        Ok(token)
    }

    pub async fn call_next(&self, queue_id: Uuid) -> Result<Token, QueueError> {
        self.change_token(queue_id, None, |queue, now| queue.call_next(now)).await
    }

    pub async fn call_token(&self, queue_id: Uuid, token_id: Uuid) -> Result<Token, QueueError> {
        self.change_token(queue_id, Some(token_id), |queue, now| queue.call_token(token_id, now))
            .await
    }

    pub async fn complete(&self, queue_id: Uuid, token_id: Uuid) -> Result<Token, QueueError> {
        self.change_token(queue_id, Some(token_id), |queue, now| queue.complete(token_id, now))
            .await
    }

    pub async fn skip(&self, queue_id: Uuid, token_id: Uuid) -> Result<Token, QueueError> {
        self.change_token(queue_id, Some(token_id), |queue, now| queue.skip(token_id, now))
            .await
    }

    pub async fn mark_no_show(&self, queue_id: Uuid, token_id: Uuid) -> Result<Token, QueueError> {
        self.change_token(queue_id, Some(token_id), |queue, now| queue.mark_no_show(token_id, now))
            .await
    }

    pub async fn requeue(&self, queue_id: Uuid, token_id: Uuid) -> Result<Token, QueueError> {
        self.change_token(queue_id, Some(token_id), |queue, now| queue.requeue(token_id, now))
            .await
    }

    pub async fn cancel(&self, queue_id: Uuid, token_id: Uuid) -> Result<Token, QueueError> {
        self.change_token(queue_id, Some(token_id), |queue, now| queue.cancel(token_id, now))
            .await
    }

    pub async fn set_emergency(&self, queue_id: Uuid, token_id: Uuid, is_emergency: bool) -> Result<Token, QueueError> {
        let mut registry = self.registry.write().await;
        let queue = registry.queue_mut(queue_id)?;
        let now = Utc::now();

        let token = queue.set_emergency(token_id, is_emergency, now)?;

        self.publish(
            queue,
            QueueEventKind::TokenPriorityChanged { is_emergency },
            Some(&token),
            now,
        )
        .await;

        Ok(token)
    }

    pub async fn set_status(&self, queue_id: Uuid, status: QueueStatus) -> Result<DailyQueue, QueueError> {
        let today = self.today();
        let mut registry = self.registry.write().await;
        let queue = registry.queue_mut(queue_id)?;
        let from = queue.status;
        let now = Utc::now();

        let released = queue.set_status(status, today, now)?;

        info!(
            "Queue {} {} -> {} ({} token(s) marked no-show)",
            queue_id,
            from.as_str(),
            status.as_str(),
            released.len()
        );
        self.publish(
            queue,
            QueueEventKind::QueueStatusChanged { from, to: status },
            None,
            now,
        )
        .await;

        Ok(queue.clone())
    }

    pub async fn stats(&self, queue_id: Uuid) -> Result<QueueStats, QueueError> {
        let registry = self.registry.read().await;
        Ok(registry.queue(queue_id)?.stats())
    }

    pub async fn board(&self, queue_id: Uuid) -> Result<QueueBoard, QueueError> {
        let registry = self.registry.read().await;
        Ok(registry.queue(queue_id)?.board())
    }

    pub async fn position(&self, queue_id: Uuid, token_id: Uuid) -> Result<TokenPosition, QueueError> {
        let registry = self.registry.read().await;
        registry
            .queue(queue_id)?
            .position_of(token_id, self.default_service_minutes)
    }

    /// Current board wrapped as an event, sent to new realtime subscribers.
    pub async fn snapshot(&self, queue_id: Uuid) -> Result<QueueEvent, QueueError> {
        let registry = self.registry.read().await;
        let queue = registry.queue(queue_id)?;
        Ok(build_event(queue, QueueEventKind::Snapshot, None, Utc::now()))
    }

    /// Drops queues dated before `cutoff` along with their realtime channels.
    pub async fn purge_before(&self, cutoff: NaiveDate) -> usize {
        let mut registry = self.registry.write().await;

        let expired: Vec<(Uuid, NaiveDate, Uuid)> = registry
            .queues
            .values()
            .filter(|q| q.date < cutoff)
            .map(|q| (q.id, q.date, q.doctor_id))
            .collect();

        for (queue_id, date, doctor_id) in &expired {
            registry.queues.remove(queue_id);
            registry.by_doctor_day.remove(&(*doctor_id, *date));
            self.hub.remove_channel(*queue_id).await;
        }

        if !expired.is_empty() {
            info!("Purged {} queue(s) dated before {}", expired.len(), cutoff);
        }
        expired.len()
    }

    /// Applies the configured retention window relative to today.
    pub async fn purge_expired(&self) -> usize {
        let cutoff = self.today() - Duration::days(self.retention_days);
        self.purge_before(cutoff).await
    }

    async fn change_token<F>(&self, queue_id: Uuid, token_id: Option<Uuid>, op: F) -> Result<Token, QueueError>
    where
        F: FnOnce(&mut DailyQueue, DateTime<Utc>) -> Result<Token, QueueError>,
    {
        let mut registry = self.registry.write().await;
        let queue = registry.queue_mut(queue_id)?;

        // call_next always starts from a waiting token
        let from = match token_id {
            Some(id) => queue.token(id)?.status,
            None => TokenStatus::Waiting,
        };
        let now = Utc::now();

        let token = op(queue, now)?;

        debug!(
            "Token {} in queue {}: {} -> {}",
            token.token_number,
            queue_id,
            from.as_str(),
            token.status.as_str()
        );
        self.publish(
            queue,
            QueueEventKind::TokenStatusChanged { from, to: token.status },
            Some(&token),
            now,
        )
        .await;

        Ok(token)
    }

    async fn publish(&self, queue: &DailyQueue, kind: QueueEventKind, token: Option<&Token>, now: DateTime<Utc>) {
        let event = build_event(queue, kind, token, now);
        self.hub.publish(&event).await;
    }
}

fn build_event(queue: &DailyQueue, kind: QueueEventKind, token: Option<&Token>, now: DateTime<Utc>) -> QueueEvent {
    QueueEvent {
        kind,
        queue_id: queue.id,
        token: token.map(Token::public),
        board: queue.board(),
        timestamp: now,
    }
}
