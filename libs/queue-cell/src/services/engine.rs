//! Queue state machine. Everything here is synchronous and takes the current
//! time as a parameter; locking and event fan-out live in [`super::queue`].

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use shared_utils::validation::validate_phone;

use crate::error::QueueError;
use crate::models::{
    DailyQueue, PatientInfo, QueueBoard, QueueStats, QueueStatus, Token, TokenPosition, TokenStatus,
};

impl DailyQueue {
    pub fn new(doctor_id: Uuid, clinic_id: Uuid, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            clinic_id,
            date,
            status: QueueStatus::Open,
            next_token_number: 1,
            opened_at: now,
            closed_at: None,
            updated_at: now,
            tokens: Vec::new(),
        }
    }

    pub fn token(&self, token_id: Uuid) -> Result<&Token, QueueError> {
        self.tokens
            .iter()
            .find(|t| t.id == token_id)
            .ok_or_else(|| QueueError::TokenNotFound(token_id.to_string()))
    }

    fn token_mut(&mut self, token_id: Uuid) -> Result<&mut Token, QueueError> {
        self.tokens
            .iter_mut()
            .find(|t| t.id == token_id)
            .ok_or_else(|| QueueError::TokenNotFound(token_id.to_string()))
    }

    /// Issues the next token number to a patient.
    pub fn join(
        &mut self,
        patient: PatientInfo,
        is_emergency: bool,
        booked_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Token, QueueError> {
        if !self.status.accepts_patients() {
            return Err(QueueError::QueueClosed);
        }

        let name = patient.name.trim().to_string();
        if name.is_empty() {
            return Err(QueueError::ValidationError("Patient name is required".to_string()));
        }
        validate_phone(&patient.phone)?;

        if let Some(existing) = self
            .tokens
            .iter()
            .find(|t| t.status.is_active() && t.patient.phone == patient.phone)
        {
            return Err(QueueError::DuplicateToken {
                token_number: existing.token_number,
            });
        }

        let token = Token {
            id: Uuid::new_v4(),
            queue_id: self.id,
            token_number: self.next_token_number,
            status: TokenStatus::Waiting,
            is_emergency,
            patient: PatientInfo {
                name,
                phone: patient.phone,
            },
            booked_by,
            created_at: now,
            queued_at: now,
            called_at: None,
            finished_at: None,
            updated_at: now,
        };

        self.next_token_number += 1;
        self.tokens.push(token.clone());
        self.updated_at = now;

        Ok(token)
    }

    /// Waiting tokens in serving order: emergencies first, then by time queued.
    pub fn waiting_order(&self) -> Vec<&Token> {
        let mut waiting: Vec<&Token> = self
            .tokens
            .iter()
            .filter(|t| t.status == TokenStatus::Waiting)
            .collect();

        waiting.sort_by(|a, b| {
            b.is_emergency
                .cmp(&a.is_emergency)
                .then(a.queued_at.cmp(&b.queued_at))
                .then(a.token_number.cmp(&b.token_number))
        });
        waiting
    }

    pub fn now_serving(&self) -> Option<&Token> {
        self.tokens.iter().find(|t| t.status == TokenStatus::Serving)
    }

    fn ensure_can_call(&self) -> Result<(), QueueError> {
        if self.status != QueueStatus::Open {
            return Err(QueueError::QueueNotOpen(self.status));
        }
        if let Some(serving) = self.now_serving() {
            return Err(QueueError::AlreadyServing {
                token_number: serving.token_number,
            });
        }
        Ok(())
    }

    pub fn call_next(&mut self, now: DateTime<Utc>) -> Result<Token, QueueError> {
        self.ensure_can_call()?;

        let next_id = self
            .waiting_order()
            .first()
            .map(|t| t.id)
            .ok_or(QueueError::QueueEmpty)?;

        self.transition(next_id, TokenStatus::Serving, now)
    }

    /// Calls a specific waiting token out of order.
    pub fn call_token(&mut self, token_id: Uuid, now: DateTime<Utc>) -> Result<Token, QueueError> {
        self.ensure_can_call()?;
        self.transition(token_id, TokenStatus::Serving, now)
    }

    pub fn complete(&mut self, token_id: Uuid, now: DateTime<Utc>) -> Result<Token, QueueError> {
        self.transition(token_id, TokenStatus::Completed, now)
    }

    pub fn skip(&mut self, token_id: Uuid, now: DateTime<Utc>) -> Result<Token, QueueError> {
        self.transition(token_id, TokenStatus::Skipped, now)
    }

    pub fn mark_no_show(&mut self, token_id: Uuid, now: DateTime<Utc>) -> Result<Token, QueueError> {
        self.transition(token_id, TokenStatus::NoShow, now)
    }

    /// Puts a skipped token back at the end of its priority class.
    pub fn requeue(&mut self, token_id: Uuid, now: DateTime<Utc>) -> Result<Token, QueueError> {
        if self.status == QueueStatus::Closed {
            return Err(QueueError::QueueClosed);
        }
        self.transition(token_id, TokenStatus::Waiting, now)
    }

    pub fn cancel(&mut self, token_id: Uuid, now: DateTime<Utc>) -> Result<Token, QueueError> {
        self.transition(token_id, TokenStatus::Cancelled, now)
    }

    fn transition(&mut self, token_id: Uuid, target: TokenStatus, now: DateTime<Utc>) -> Result<Token, QueueError> {
        let token = self.token_mut(token_id)?;

        if !token.status.can_transition_to(&target) {
            return Err(QueueError::InvalidTransition {
                from: token.status,
                to: target,
            });
        }

        match target {
            TokenStatus::Serving => token.called_at = Some(now),
            TokenStatus::Waiting => {
                token.queued_at = now;
                token.called_at = None;
            }
            TokenStatus::Completed | TokenStatus::NoShow | TokenStatus::Cancelled => {
                token.finished_at = Some(now)
            }
            TokenStatus::Skipped => {}
        }

        token.status = target;
        token.updated_at = now;
        let updated = token.clone();
        self.updated_at = now;

        Ok(updated)
    }

    pub fn set_emergency(&mut self, token_id: Uuid, is_emergency: bool, now: DateTime<Utc>) -> Result<Token, QueueError> {
        let token = self.token_mut(token_id)?;

        if !matches!(token.status, TokenStatus::Waiting | TokenStatus::Skipped) {
            return Err(QueueError::PriorityLocked);
        }

        token.is_emergency = is_emergency;
        token.updated_at = now;
        let updated = token.clone();
        self.updated_at = now;

        Ok(updated)
    }

    /// Changes the queue status. Closing turns every waiting or skipped token
    /// into a no-show and is refused while someone is being served. A closed
    /// queue can only be reopened on its own day. Returns the tokens that
    /// changed as a side effect.
    pub fn set_status(
        &mut self,
        target: QueueStatus,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Token>, QueueError> {
        if !self.status.can_transition_to(&target) {
            return Err(QueueError::InvalidQueueTransition {
                from: self.status,
                to: target,
            });
        }

        if self.status == QueueStatus::Closed && target != QueueStatus::Closed && self.date < today {
            return Err(QueueError::ValidationError(format!(
                "Cannot reopen the queue for {}, it is a past date",
                self.date
            )));
        }

        let mut changed = Vec::new();

        if target == QueueStatus::Closed {
            if let Some(serving) = self.now_serving() {
                return Err(QueueError::AlreadyServing {
                    token_number: serving.token_number,
                });
            }

            for token in self
                .tokens
                .iter_mut()
                .filter(|t| matches!(t.status, TokenStatus::Waiting | TokenStatus::Skipped))
            {
                token.status = TokenStatus::NoShow;
                token.finished_at = Some(now);
                token.updated_at = now;
                changed.push(token.clone());
            }
            self.closed_at = Some(now);
        } else {
            self.closed_at = None;
        }

        self.status = target;
        self.updated_at = now;

        Ok(changed)
    }

    /// Mean minutes between call and completion over completed tokens.
    pub fn average_service_minutes(&self) -> Option<f64> {
        let samples: Vec<f64> = self.tokens.iter().filter_map(Token::service_minutes).collect();
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        }
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.tokens.len() as u32,
            average_service_minutes: self.average_service_minutes(),
            ..QueueStats::default()
        };

        for token in &self.tokens {
            match token.status {
                TokenStatus::Waiting => stats.waiting += 1,
                TokenStatus::Serving => stats.serving += 1,
                TokenStatus::Completed => stats.completed += 1,
                TokenStatus::Skipped => stats.skipped += 1,
                TokenStatus::NoShow => stats.no_show += 1,
                TokenStatus::Cancelled => stats.cancelled += 1,
            }
        }

        stats
    }

    pub fn board(&self) -> QueueBoard {
        let mut skipped: Vec<_> = self
            .tokens
            .iter()
            .filter(|t| t.status == TokenStatus::Skipped)
            .map(Token::public)
            .collect();
        skipped.sort_by_key(|t| t.token_number);

        QueueBoard {
            queue_id: self.id,
            doctor_id: self.doctor_id,
            date: self.date,
            status: self.status,
            now_serving: self.now_serving().map(Token::public),
            up_next: self.waiting_order().into_iter().map(Token::public).collect(),
            skipped,
            stats: self.stats(),
            updated_at: self.updated_at,
        }
    }

    /// Where a token stands, with a wait estimate based on the observed
    /// service time (or `default_service_minutes` before anyone is done).
    pub fn position_of(&self, token_id: Uuid, default_service_minutes: u32) -> Result<TokenPosition, QueueError> {
        let token = self.token(token_id)?;
        let order = self.waiting_order();
        let position = order.iter().position(|t| t.id == token_id);
        let tokens_ahead = position.unwrap_or(0);

        let estimated_wait_minutes = position.map(|ahead| {
            let per_patient = self
                .average_service_minutes()
                .unwrap_or(default_service_minutes as f64);
            (ahead as f64 * per_patient).round() as u32
        });

        Ok(TokenPosition {
            token: token.public(),
            queue_status: self.status,
            position,
            tokens_ahead,
            estimated_wait_minutes,
            now_serving: self.now_serving().map(|t| t.token_number),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn patient(n: u32) -> PatientInfo {
        PatientInfo {
            name: format!("Patient {}", n),
            phone: format!("+9198765432{:02}", n),
        }
    }

    fn queue_with(count: u32) -> (DailyQueue, Vec<Token>, DateTime<Utc>) {
        let start = Utc::now();
        let mut queue = DailyQueue::new(Uuid::new_v4(), Uuid::new_v4(), start.date_naive(), start);
        let tokens = (0..count)
            .map(|n| {
                queue
                    .join(patient(n), false, None, start + Duration::seconds(n as i64))
                    .unwrap()
            })
            .collect();
        (queue, tokens, start)
    }

    #[test]
    fn test_token_numbers_are_sequential() {
        let (queue, tokens, _) = queue_with(3);
        assert_eq!(tokens.iter().map(|t| t.token_number).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(queue.next_token_number, 4);
    }

    #[test]
    fn test_numbers_are_not_reused_after_cancel() {
        let (mut queue, tokens, now) = queue_with(2);
        queue.cancel(tokens[1].id, now).unwrap();
        let again = queue.join(patient(1), false, None, now).unwrap();
        assert_eq!(again.token_number, 3);
    }

    #[test]
    fn test_duplicate_phone_is_rejected_while_active() {
        let (mut queue, _, now) = queue_with(1);
        assert_matches!(
            queue.join(patient(0), false, None, now),
            Err(QueueError::DuplicateToken { token_number: 1 })
        );
    }

    #[test]
    fn test_join_validates_patient() {
        let (mut queue, _, now) = queue_with(0);
        let nameless = PatientInfo {
            name: "  ".to_string(),
            phone: "+919876543210".to_string(),
        };
        assert_matches!(queue.join(nameless, false, None, now), Err(QueueError::ValidationError(_)));

        let bad_phone = PatientInfo {
            name: "Ravi".to_string(),
            phone: "98765".to_string(),
        };
        assert_matches!(queue.join(bad_phone, false, None, now), Err(QueueError::InvalidPhone(_)));
    }

    #[test]
    fn test_emergency_is_called_first() {
        let (mut queue, tokens, now) = queue_with(3);
        queue.set_emergency(tokens[2].id, true, now).unwrap();

        let first = queue.call_next(now).unwrap();
        assert_eq!(first.id, tokens[2].id);
        queue.complete(first.id, now).unwrap();

        let second = queue.call_next(now).unwrap();
        assert_eq!(second.id, tokens[0].id);
    }

    #[test]
    fn test_only_one_token_serving() {
        let (mut queue, _, now) = queue_with(2);
        queue.call_next(now).unwrap();
        assert_matches!(queue.call_next(now), Err(QueueError::AlreadyServing { token_number: 1 }));
    }

    #[test]
    fn test_call_requires_open_queue() {
        let (mut queue, _, now) = queue_with(1);
        queue.set_status(QueueStatus::Paused, now.date_naive(), now).unwrap();
        assert_matches!(queue.call_next(now), Err(QueueError::QueueNotOpen(QueueStatus::Paused)));
    }

    #[test]
    fn test_empty_queue() {
        let (mut queue, _, now) = queue_with(0);
        assert_matches!(queue.call_next(now), Err(QueueError::QueueEmpty));
    }

    #[test]
    fn test_requeued_token_goes_to_back() {
        let (mut queue, tokens, start) = queue_with(3);
        queue.skip(tokens[0].id, start).unwrap();
        queue.requeue(tokens[0].id, start + Duration::minutes(5)).unwrap();

        let order: Vec<u32> = queue.waiting_order().iter().map(|t| t.token_number).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_illegal_transitions() {
        let (mut queue, tokens, now) = queue_with(1);
        let id = tokens[0].id;

        assert_matches!(
            queue.complete(id, now),
            Err(QueueError::InvalidTransition {
                from: TokenStatus::Waiting,
                to: TokenStatus::Completed
            })
        );
        assert_matches!(queue.requeue(id, now), Err(QueueError::InvalidTransition { .. }));

        queue.call_next(now).unwrap();
        queue.complete(id, now).unwrap();
        assert_matches!(queue.skip(id, now), Err(QueueError::InvalidTransition { .. }));
        assert_matches!(queue.cancel(id, now), Err(QueueError::InvalidTransition { .. }));
    }

    #[test]
    fn test_close_marks_leftovers_no_show() {
        let (mut queue, tokens, now) = queue_with(3);
        queue.skip(tokens[1].id, now).unwrap();
        queue.call_next(now).unwrap();

        assert_matches!(
            queue.set_status(QueueStatus::Closed, now.date_naive(), now),
            Err(QueueError::AlreadyServing { .. })
        );

        queue.complete(tokens[0].id, now).unwrap();
        let changed = queue.set_status(QueueStatus::Closed, now.date_naive(), now).unwrap();

        assert_eq!(changed.len(), 2);
        assert!(changed.iter().all(|t| t.status == TokenStatus::NoShow));
        assert_eq!(queue.closed_at, Some(now));
        assert_matches!(queue.join(patient(9), false, None, now), Err(QueueError::QueueClosed));

        queue.set_status(QueueStatus::Open, now.date_naive(), now).unwrap();
        assert!(queue.closed_at.is_none());
        assert!(queue.join(patient(9), false, None, now).is_ok());
    }

    #[test]
    fn test_past_day_queue_cannot_be_reopened() {
        let now = Utc::now();
        let yesterday = now.date_naive() - Duration::days(1);
        let mut queue = DailyQueue::new(Uuid::new_v4(), Uuid::new_v4(), yesterday, now);

        queue.set_status(QueueStatus::Closed, now.date_naive(), now).unwrap();
        assert_matches!(
            queue.set_status(QueueStatus::Open, now.date_naive(), now),
            Err(QueueError::ValidationError(_))
        );
        assert_eq!(queue.status, QueueStatus::Closed);
        assert_matches!(queue.join(patient(1), false, None, now), Err(QueueError::QueueClosed));

        // the same queue could still be reopened on its own day
        queue.set_status(QueueStatus::Open, yesterday, now).unwrap();
        assert_eq!(queue.status, QueueStatus::Open);
    }

    #[test]
    fn test_stats_match_token_statuses() {
        let (mut queue, tokens, now) = queue_with(6);
        queue.call_next(now).unwrap();
        queue.complete(tokens[0].id, now + Duration::minutes(8)).unwrap();
        queue.skip(tokens[1].id, now).unwrap();
        queue.cancel(tokens[2].id, now).unwrap();
        queue.call_next(now).unwrap();
        queue.mark_no_show(tokens[3].id, now).unwrap();
        queue.call_next(now).unwrap();

        let stats = queue.stats();
        assert_eq!(stats.total, 6);
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.serving, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.no_show, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.average_service_minutes, Some(8.0));
    }

    #[test]
    fn test_position_and_wait_estimate() {
        let (mut queue, tokens, now) = queue_with(4);

        let position = queue.position_of(tokens[2].id, 10).unwrap();
        assert_eq!(position.position, Some(2));
        assert_eq!(position.estimated_wait_minutes, Some(20));
        assert_eq!(position.now_serving, None);

        queue.call_next(now).unwrap();
        queue.complete(tokens[0].id, now + Duration::minutes(4)).unwrap();
        queue.call_next(now + Duration::minutes(4)).unwrap();

        let position = queue.position_of(tokens[3].id, 10).unwrap();
        assert_eq!(position.position, Some(1));
        assert_eq!(position.tokens_ahead, 1);
        assert_eq!(position.estimated_wait_minutes, Some(4));
        assert_eq!(position.now_serving, Some(2));

        let serving = queue.position_of(tokens[1].id, 10).unwrap();
        assert_eq!(serving.position, None);
        assert_eq!(serving.estimated_wait_minutes, None);
    }

    #[test]
    fn test_priority_locked_once_called() {
        let (mut queue, tokens, now) = queue_with(1);
        queue.call_next(now).unwrap();
        assert_matches!(
            queue.set_emergency(tokens[0].id, true, now),
            Err(QueueError::PriorityLocked)
        );
    }

    #[test]
    fn test_board_hides_patient_details() {
        let (mut queue, tokens, now) = queue_with(3);
        queue.skip(tokens[2].id, now).unwrap();
        queue.call_next(now).unwrap();

        let board = queue.board();
        assert_eq!(board.now_serving.as_ref().map(|t| t.token_number), Some(1));
        assert_eq!(board.up_next.iter().map(|t| t.token_number).collect::<Vec<_>>(), vec![2]);
        assert_eq!(board.skipped.iter().map(|t| t.token_number).collect::<Vec<_>>(), vec![3]);

        let json = serde_json::to_string(&board).unwrap();
        assert!(!json.contains("Patient"));
        assert!(!json.contains("+91"));
    }
}
