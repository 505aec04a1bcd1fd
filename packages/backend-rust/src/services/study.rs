//! Review engine and due-queue reader.
//!
//! `review_card` runs one unit of work: lock the card, schedule, persist the
//! new state, append the review log and the audit diff, commit. The whole
//! sequence is bounded by the configured deadline; when it expires the unit
//! of work is dropped, which rolls the transaction back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use uuid::Uuid;
use vocab_srs::{CardStatus, Grade, Scheduler};

use crate::clock::Clock;
use crate::db::{DueCardsQuery, Store};
use crate::model::{AuditRecord, Card, DashboardStats, EntityType, ReviewLog, StudyItem};
use crate::services::audit;
use crate::services::ServiceError;

pub const DEFAULT_QUEUE_LIMIT: i64 = 10;
pub const MAX_QUEUE_LIMIT: i64 = 1000;
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 1000;

/// Explicit review times must fall within these years so the computed due
/// date stays representable and sortable in every store.
pub const REVIEW_YEARS: std::ops::RangeInclusive<i32> = 1..=9000;

#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub deadline: Duration,
    pub queue_default_limit: i64,
    pub queue_max_limit: i64,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10),
            queue_default_limit: DEFAULT_QUEUE_LIMIT,
            queue_max_limit: MAX_QUEUE_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewCardInput {
    pub card_id: Uuid,
    pub grade: Grade,
    pub duration_ms: Option<i32>,
    /// Defaults to the service clock.
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub card: Card,
    pub review_log: ReviewLog,
    pub next_review_at: DateTime<Utc>,
    pub status_changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StudyQueueRequest {
    pub limit: Option<i64>,
    pub statuses: Option<Vec<CardStatus>>,
}

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    settings: ReviewSettings,
}

impl ReviewService {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        settings: ReviewSettings,
    ) -> Self {
        Self {
            store,
            scheduler,
            clock,
            settings,
        }
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    // ==================== Review ====================

    pub async fn review_card(&self, input: ReviewCardInput) -> Result<ReviewResult, ServiceError> {
        if input.card_id.is_nil() {
            return Err(ServiceError::invalid("card id must not be nil"));
        }
        let grade = self
            .scheduler
            .scale()
            .validate(input.grade)
            .map_err(|e| ServiceError::invalid(e.to_string()))?;
        if matches!(input.duration_ms, Some(ms) if ms < 0) {
            return Err(ServiceError::invalid("durationMs must not be negative"));
        }

        if let Some(at) = input.reviewed_at {
            if !REVIEW_YEARS.contains(&at.year()) {
                return Err(ServiceError::invalid(format!(
                    "reviewedAt must fall between years {} and {}",
                    REVIEW_YEARS.start(),
                    REVIEW_YEARS.end()
                )));
            }
        }

        let reviewed_at = input.reviewed_at.unwrap_or_else(|| self.clock.now());
        let work = self.apply_review(input.card_id, grade, input.duration_ms, reviewed_at);

        match tokio::time::timeout(self.settings.deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    card_id = %input.card_id,
                    deadline_ms = self.settings.deadline.as_millis() as u64,
                    "review deadline expired, rolled back"
                );
                Err(ServiceError::Timeout(format!(
                    "review of card {} did not finish within {} ms",
                    input.card_id,
                    self.settings.deadline.as_millis()
                )))
            }
        }
    }

    async fn apply_review(
        &self,
        card_id: Uuid,
        grade: Grade,
        duration_ms: Option<i32>,
        reviewed_at: DateTime<Utc>,
    ) -> Result<ReviewResult, ServiceError> {
        let mut uow = self.store.begin().await?;

        let Some(card) = uow.lock_card(card_id).await? else {
            return Err(ServiceError::NotFound(format!("card {card_id} not found")));
        };
        tracing::debug!(card_id = %card_id, status = %card.status, "card locked");

        let before = card.schedule_state();
        let schedule = self.scheduler.calculate(&before, grade, reviewed_at);
        let updated = card.rescheduled(&schedule, self.clock.now());
        tracing::debug!(
            card_id = %card_id,
            grade = %grade,
            interval_days = schedule.interval_days,
            ease_factor = schedule.ease_factor,
            "schedule computed"
        );

        uow.update_card_schedule(&updated).await?;

        let review_log = ReviewLog {
            id: Uuid::new_v4(),
            card_id,
            grade,
            duration_ms,
            reviewed_at,
            state_before: before.into(),
            state_after: schedule.state().into(),
        };
        uow.append_review_log(&review_log).await?;

        let changes = audit::diff_card(&card, &updated);
        if !changes.is_empty() {
            let record =
                AuditRecord::update(EntityType::Card, card_id, changes, updated.updated_at);
            uow.append_audit(&record).await?;
        }

        uow.commit().await?;

        tracing::info!(
            card_id = %card_id,
            grade = %grade,
            status = %updated.status,
            interval_days = updated.interval_days,
            "review committed"
        );

        Ok(ReviewResult {
            status_changed: card.status != updated.status,
            next_review_at: schedule.due_at,
            card: updated,
            review_log,
        })
    }

    // ==================== Due Queue ====================

    pub async fn study_queue(&self, request: StudyQueueRequest) -> Result<Vec<Card>, ServiceError> {
        self.due_cards(self.clock.now(), request.limit, request.statuses)
            .await
    }

    /// Cards due at `now`, most overdue first; never-scheduled cards lead.
    pub async fn due_cards(
        &self,
        now: DateTime<Utc>,
        limit: Option<i64>,
        statuses: Option<Vec<CardStatus>>,
    ) -> Result<Vec<Card>, ServiceError> {
        let limit = self.resolve_queue_limit(limit)?;
        let statuses = match statuses {
            Some(list) if !list.is_empty() => dedup(list),
            _ => CardStatus::ALL
                .into_iter()
                .filter(|status| *status != CardStatus::Mastered)
                .collect(),
        };

        let query = DueCardsQuery {
            now,
            limit,
            statuses,
        };
        Ok(self.store.due_cards(&query).await?)
    }

    /// Due cards with their dictionary entries, in due-queue order.
    pub async fn study_queue_entries(
        &self,
        request: StudyQueueRequest,
    ) -> Result<Vec<StudyItem>, ServiceError> {
        let cards = self.study_queue(request).await?;
        if cards.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = cards.iter().map(|card| card.entry_id).collect();
        let mut entries: HashMap<Uuid, _> = self
            .store
            .entries_by_ids(&ids)
            .await?
            .into_iter()
            .map(|entry| (entry.id, entry))
            .collect();

        let mut items = Vec::with_capacity(cards.len());
        for card in cards {
            match entries.remove(&card.entry_id) {
                Some(entry) => items.push(StudyItem { card, entry }),
                None => {
                    tracing::warn!(card_id = %card.id, entry_id = %card.entry_id, "entry missing for due card");
                }
            }
        }
        Ok(items)
    }

    fn resolve_queue_limit(&self, limit: Option<i64>) -> Result<i64, ServiceError> {
        match limit {
            None => Ok(self.settings.queue_default_limit),
            Some(n) if n <= 0 => Err(ServiceError::invalid("limit must be positive")),
            Some(n) => Ok(n.min(self.settings.queue_max_limit)),
        }
    }

    // ==================== History & Stats ====================

    /// Review logs for one card, newest first.
    pub async fn card_history(
        &self,
        card_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<ReviewLog>, ServiceError> {
        let limit = match limit {
            Some(n) if n > 0 => n.min(MAX_HISTORY_LIMIT),
            _ => DEFAULT_HISTORY_LIMIT,
        };

        if self.store.get_card(card_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("card {card_id} not found")));
        }
        Ok(self.store.review_logs_for_card(card_id, limit).await?)
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ServiceError> {
        Ok(self.store.dashboard_stats(self.clock.now()).await?)
    }
}

fn dedup(list: Vec<CardStatus>) -> Vec<CardStatus> {
    let mut out = Vec::with_capacity(list.len());
    for status in list {
        if !out.contains(&status) {
            out.push(status);
        }
    }
    out
}
