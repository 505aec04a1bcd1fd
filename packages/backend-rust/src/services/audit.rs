//! Field-level change sets for audit records.
//!
//! Only the scheduling fields the review engine may touch are compared.
//! An empty change set means "nothing changed" and callers skip the write.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::model::{Card, ChangeSet, DictionaryEntry, FieldChange};

pub const FIELD_STATUS: &str = "status";
pub const FIELD_DUE_AT: &str = "due_at";
pub const FIELD_INTERVAL_DAYS: &str = "interval_days";
pub const FIELD_EASE_FACTOR: &str = "ease_factor";
pub const FIELD_ENTRY_ID: &str = "entry_id";
pub const FIELD_TEXT: &str = "text";

pub fn diff_card(old: &Card, new: &Card) -> ChangeSet {
    let mut changes = ChangeSet::new();

    if old.status != new.status {
        record(&mut changes, FIELD_STATUS, json!(old.status), json!(new.status));
    }
    if !same_instant(old.due_at, new.due_at) {
        record(
            &mut changes,
            FIELD_DUE_AT,
            timestamp_value(old.due_at),
            timestamp_value(new.due_at),
        );
    }
    if old.interval_days != new.interval_days {
        record(
            &mut changes,
            FIELD_INTERVAL_DAYS,
            json!(old.interval_days),
            json!(new.interval_days),
        );
    }
    if old.ease_factor != new.ease_factor {
        record(
            &mut changes,
            FIELD_EASE_FACTOR,
            json!(old.ease_factor),
            json!(new.ease_factor),
        );
    }

    changes
}

/// Every scheduling field plus the entry reference, each with `old = null`.
pub fn creation_changes(card: &Card) -> ChangeSet {
    let mut changes = ChangeSet::new();
    record(&mut changes, FIELD_ENTRY_ID, Value::Null, json!(card.entry_id));
    record(&mut changes, FIELD_STATUS, Value::Null, json!(card.status));
    record(&mut changes, FIELD_DUE_AT, Value::Null, timestamp_value(card.due_at));
    record(&mut changes, FIELD_INTERVAL_DAYS, Value::Null, json!(card.interval_days));
    record(&mut changes, FIELD_EASE_FACTOR, Value::Null, json!(card.ease_factor));
    changes
}

pub fn entry_creation_changes(entry: &DictionaryEntry) -> ChangeSet {
    let mut changes = ChangeSet::new();
    record(&mut changes, FIELD_TEXT, Value::Null, json!(entry.text));
    changes
}

fn record(changes: &mut ChangeSet, field: &str, old: Value, new: Value) {
    changes.insert(field.to_string(), FieldChange { old, new });
}

/// Two nulls are equal; null and a timestamp are not.
fn same_instant(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Same precision as the stores keep, so two distinct stored instants never
/// render alike.
fn timestamp_value(value: Option<DateTime<Utc>>) -> Value {
    match value {
        Some(at) => Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;
    use vocab_srs::CardStatus;

    use super::*;

    fn card() -> Card {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 7, 15, 0).unwrap();
        Card::new(Uuid::new_v4(), at)
    }

    #[test]
    fn identical_cards_produce_no_changes() {
        let old = card();
        assert!(diff_card(&old, &old.clone()).is_empty());
    }

    #[test]
    fn only_due_at_changed_gives_one_key() {
        let old = Card {
            due_at: Some(Utc.with_ymd_and_hms(2026, 3, 11, 7, 15, 0).unwrap()),
            ..card()
        };
        let new = Card {
            due_at: old.due_at.map(|at| at + Duration::days(1)),
            ..old.clone()
        };

        let changes = diff_card(&old, &new);
        assert_eq!(changes.len(), 1);
        let change = &changes[FIELD_DUE_AT];
        assert_eq!(change.old, json!("2026-03-11T07:15:00.000000Z"));
        assert_eq!(change.new, json!("2026-03-12T07:15:00.000000Z"));
    }

    #[test]
    fn sub_millisecond_moves_render_distinct_values() {
        let due = Utc.with_ymd_and_hms(2026, 3, 11, 7, 15, 0).unwrap();
        let old = Card {
            due_at: Some(due),
            ..card()
        };
        let new = Card {
            due_at: Some(due + Duration::microseconds(250)),
            ..old.clone()
        };

        let changes = diff_card(&old, &new);
        let change = &changes[FIELD_DUE_AT];
        assert_ne!(change.old, change.new);
        assert_eq!(change.new, json!("2026-03-11T07:15:00.000250Z"));
    }

    #[test]
    fn null_to_timestamp_is_a_change() {
        let old = card();
        let new = Card {
            due_at: Some(old.created_at),
            ..old.clone()
        };
        let changes = diff_card(&old, &new);
        assert_eq!(changes[FIELD_DUE_AT].old, Value::Null);
        assert!(changes[FIELD_DUE_AT].new.is_string());
    }

    #[test]
    fn non_scheduling_fields_are_ignored() {
        let old = card();
        let new = Card {
            review_count: 9,
            lapses: 3,
            updated_at: old.updated_at + Duration::hours(1),
            ..old.clone()
        };
        assert!(diff_card(&old, &new).is_empty());
    }

    #[test]
    fn every_scheduling_field_is_reported() {
        let old = card();
        let new = Card {
            status: CardStatus::Review,
            due_at: Some(old.created_at + Duration::days(1)),
            interval_days: 1,
            ease_factor: 2.35,
            ..old.clone()
        };
        let changes = diff_card(&old, &new);
        let keys: Vec<&str> = changes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["due_at", "ease_factor", "interval_days", "status"]);
        assert_eq!(changes[FIELD_STATUS].old, json!("NEW"));
        assert_eq!(changes[FIELD_STATUS].new, json!("REVIEW"));
    }

    #[test]
    fn creation_changes_start_from_null() {
        let card = card();
        let changes = creation_changes(&card);
        assert_eq!(changes.len(), 5);
        assert!(changes.values().all(|change| change.old.is_null()));
        assert_eq!(changes[FIELD_DUE_AT].new, Value::Null);
        assert_eq!(changes[FIELD_ENTRY_ID].new, json!(card.entry_id));
    }
}
