//! Persisted records: dictionary entries, cards, review logs and audit records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vocab_srs::{CardStatus, Grade, Schedule, ScheduleState, SchedulerSnapshot, DEFAULT_EASE};

// ==================== Dictionary Entry ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryEntry {
    pub id: Uuid,
    pub text: String,
    pub text_normalized: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trimmed, whitespace-collapsed, lower-cased form used for uniqueness.
pub fn normalize_entry_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ==================== Card ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub status: CardStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub interval_days: i32,
    pub ease_factor: f64,
    pub review_count: i32,
    pub lapses: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// A never-reviewed card: NEW, unscheduled, default ease.
    pub fn new(entry_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_id,
            status: CardStatus::New,
            due_at: None,
            interval_days: 0,
            ease_factor: DEFAULT_EASE,
            review_count: 0,
            lapses: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn schedule_state(&self) -> ScheduleState {
        ScheduleState {
            status: self.status,
            interval_days: self.interval_days,
            ease_factor: self.ease_factor,
            review_count: self.review_count,
            lapses: self.lapses,
        }
    }

    /// Copy carrying the scheduling fields of `schedule`.
    pub fn rescheduled(&self, schedule: &Schedule, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: schedule.status,
            due_at: Some(schedule.due_at),
            interval_days: schedule.interval_days,
            ease_factor: schedule.ease_factor,
            review_count: schedule.review_count,
            lapses: schedule.lapses,
            updated_at,
            ..self.clone()
        }
    }
}

// ==================== Review Log ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLog {
    pub id: Uuid,
    pub card_id: Uuid,
    pub grade: Grade,
    pub duration_ms: Option<i32>,
    pub reviewed_at: DateTime<Utc>,
    pub state_before: SchedulerSnapshot,
    pub state_after: SchedulerSnapshot,
}

// ==================== Audit ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Card,
    DictionaryEntry,
}

impl EntityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityType::Card => "CARD",
            EntityType::DictionaryEntry => "DICTIONARY_ENTRY",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CARD" => Ok(EntityType::Card),
            "DICTIONARY_ENTRY" => Ok(EntityType::DictionaryEntry),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

/// Changed field name -> old/new pair, in field-name order.
pub type ChangeSet = BTreeMap<String, FieldChange>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub changes: ChangeSet,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn create(
        entity_type: EntityType,
        entity_id: Uuid,
        changes: ChangeSet,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(entity_type, entity_id, AuditAction::Create, changes, at)
    }

    pub fn update(
        entity_type: EntityType,
        entity_id: Uuid,
        changes: ChangeSet,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(entity_type, entity_id, AuditAction::Update, changes, at)
    }

    fn new(
        entity_type: EntityType,
        entity_id: Uuid,
        action: AuditAction,
        changes: ChangeSet,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id,
            action,
            changes,
            created_at: at,
        }
    }
}

// ==================== Read Models ====================

/// A due card together with its dictionary entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyItem {
    pub card: Card,
    pub entry: DictionaryEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_entries: i64,
    pub total_cards: i64,
    pub new_cards: i64,
    pub learning_cards: i64,
    pub review_cards: i64,
    pub mastered_cards: i64,
    pub due_now: i64,
}
