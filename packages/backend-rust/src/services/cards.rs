use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use vocab_srs::{CardStatus, DEFAULT_EASE, MAX_INTERVAL_DAYS, MIN_EASE};

use crate::clock::Clock;
use crate::db::{Store, StoreError};
use crate::model::{normalize_entry_text, AuditRecord, Card, DictionaryEntry, EntityType};
use crate::services::audit;
use crate::services::ServiceError;

/// Upper bound accepted for a manually supplied ease factor.
pub const MAX_EASE: f64 = 3.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardInput {
    pub entry_id: Uuid,
    pub status: Option<CardStatus>,
    pub due_at: Option<DateTime<Utc>>,
    pub interval_days: Option<i32>,
    pub ease_factor: Option<f64>,
}

/// Partial edit of a card's schedule. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCardInput {
    pub status: Option<CardStatus>,
    pub due_at: Option<DateTime<Utc>>,
    pub interval_days: Option<i32>,
    pub ease_factor: Option<f64>,
}

impl UpdateCardInput {
    fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.due_at.is_none()
            && self.interval_days.is_none()
            && self.ease_factor.is_none()
    }
}

#[derive(Clone)]
pub struct CardService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl CardService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn register_entry(&self, text: &str) -> Result<DictionaryEntry, ServiceError> {
        let normalized = normalize_entry_text(text);
        if normalized.is_empty() {
            return Err(ServiceError::invalid("entry text must not be empty"));
        }

        let now = self.clock.now();
        let entry = DictionaryEntry {
            id: Uuid::new_v4(),
            text: text.trim().to_string(),
            text_normalized: normalized,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await?;
        uow.insert_entry(&entry).await.map_err(|err| match err {
            StoreError::Duplicate => {
                ServiceError::AlreadyExists(format!("entry \"{}\" already exists", entry.text))
            }
            other => other.into(),
        })?;
        let record = AuditRecord::create(
            EntityType::DictionaryEntry,
            entry.id,
            audit::entry_creation_changes(&entry),
            now,
        );
        uow.append_audit(&record).await?;
        uow.commit().await?;

        tracing::info!(entry_id = %entry.id, "dictionary entry registered");
        Ok(entry)
    }

    pub async fn create_card(&self, input: CreateCardInput) -> Result<Card, ServiceError> {
        let now = self.clock.now();
        let card = build_card(&input, now)?;

        let mut uow = self.store.begin().await?;

        if uow.get_entry(input.entry_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!(
                "entry {} not found",
                input.entry_id
            )));
        }
        if uow.find_card_by_entry(input.entry_id).await?.is_some() {
            return Err(already_has_card(input.entry_id));
        }

        // A concurrent insert for the same entry loses on the unique index.
        uow.insert_card(&card).await.map_err(|err| match err {
            StoreError::Duplicate => already_has_card(input.entry_id),
            other => other.into(),
        })?;

        let record = AuditRecord::create(
            EntityType::Card,
            card.id,
            audit::creation_changes(&card),
            now,
        );
        uow.append_audit(&record).await?;
        uow.commit().await?;

        tracing::info!(card_id = %card.id, entry_id = %card.entry_id, "card created");
        Ok(card)
    }

    /// Applies a manual schedule edit under the card lock. An edit that
    /// changes nothing returns the stored card without writing.
    pub async fn update_card(
        &self,
        card_id: Uuid,
        input: UpdateCardInput,
    ) -> Result<Card, ServiceError> {
        if card_id.is_nil() {
            return Err(ServiceError::invalid("cardId must not be nil"));
        }
        if let Some(days) = input.interval_days {
            check_interval(days)?;
        }
        if let Some(ease) = input.ease_factor {
            check_ease(ease)?;
        }
        if input.is_empty() {
            return self.get_card(card_id).await;
        }

        let mut uow = self.store.begin().await?;
        let card = uow
            .lock_card(card_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("card {card_id} not found")))?;

        let edited = Card {
            status: input.status.unwrap_or(card.status),
            due_at: input.due_at.or(card.due_at),
            interval_days: input.interval_days.unwrap_or(card.interval_days),
            ease_factor: input.ease_factor.unwrap_or(card.ease_factor),
            ..card.clone()
        };
        let now = self.clock.now();
        check_new_not_ahead(edited.status, edited.due_at, now)?;

        let changes = audit::diff_card(&card, &edited);
        if changes.is_empty() {
            return Ok(card);
        }

        let updated = Card {
            updated_at: now,
            ..edited
        };
        uow.update_card_schedule(&updated).await?;
        let record = AuditRecord::update(EntityType::Card, card_id, changes, now);
        uow.append_audit(&record).await?;
        uow.commit().await?;

        tracing::info!(
            card_id = %card_id,
            fields = record.changes.len(),
            "card schedule edited"
        );
        Ok(updated)
    }

    pub async fn get_card(&self, card_id: Uuid) -> Result<Card, ServiceError> {
        self.store
            .get_card(card_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("card {card_id} not found")))
    }

    /// Audit records for one card, oldest first.
    pub async fn audit_trail(&self, card_id: Uuid) -> Result<Vec<AuditRecord>, ServiceError> {
        self.get_card(card_id).await?;
        Ok(self
            .store
            .audit_records_for(EntityType::Card, card_id)
            .await?)
    }
}

fn already_has_card(entry_id: Uuid) -> ServiceError {
    ServiceError::AlreadyExists(format!("a card already exists for entry {entry_id}"))
}

fn build_card(input: &CreateCardInput, now: DateTime<Utc>) -> Result<Card, ServiceError> {
    if input.entry_id.is_nil() {
        return Err(ServiceError::invalid("entryId must not be nil"));
    }

    let interval_days = input.interval_days.unwrap_or(0);
    check_interval(interval_days)?;
    let ease_factor = input.ease_factor.unwrap_or(DEFAULT_EASE);
    check_ease(ease_factor)?;
    let status = input.status.unwrap_or(CardStatus::New);
    check_new_not_ahead(status, input.due_at, now)?;

    Ok(Card {
        status,
        due_at: input.due_at,
        interval_days,
        ease_factor,
        ..Card::new(input.entry_id, now)
    })
}

fn check_interval(interval_days: i32) -> Result<(), ServiceError> {
    if !(0..=MAX_INTERVAL_DAYS).contains(&interval_days) {
        return Err(ServiceError::invalid(format!(
            "intervalDays must be between 0 and {MAX_INTERVAL_DAYS}"
        )));
    }
    Ok(())
}

fn check_ease(ease_factor: f64) -> Result<(), ServiceError> {
    if !ease_factor.is_finite() || !(MIN_EASE..=MAX_EASE).contains(&ease_factor) {
        return Err(ServiceError::invalid(format!(
            "easeFactor must be between {MIN_EASE} and {MAX_EASE}"
        )));
    }
    Ok(())
}

fn check_new_not_ahead(
    status: CardStatus,
    due_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if status == CardStatus::New && matches!(due_at, Some(due) if due > now) {
        return Err(ServiceError::invalid(
            "a NEW card cannot be scheduled in the future",
        ));
    }
    Ok(())
}
