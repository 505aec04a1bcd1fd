use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;
use vocab_srs::CardStatus;

use vocab_backend_rust::model::Card;
use vocab_backend_rust::services::audit::diff_card;

fn status() -> impl Strategy<Value = CardStatus> {
    prop::sample::select(CardStatus::ALL.to_vec())
}

fn card_from(
    base: &Card,
    status: CardStatus,
    due_offset: Option<i64>,
    interval_days: i32,
    ease_factor: f64,
) -> Card {
    Card {
        status,
        due_at: due_offset.map(|minutes| base.created_at + Duration::minutes(minutes)),
        interval_days,
        ease_factor,
        ..base.clone()
    }
}

proptest! {
    #[test]
    fn diff_reports_exactly_the_changed_fields(
        s1 in status(), s2 in status(),
        d1 in prop::option::of(-10_000i64..10_000), d2 in prop::option::of(-10_000i64..10_000),
        i1 in 0i32..400, i2 in 0i32..400,
        e1 in 1.3f64..3.0, e2 in 1.3f64..3.0,
    ) {
        let base = Card::new(Uuid::new_v4(), Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let old = card_from(&base, s1, d1, i1, e1);
        let new = card_from(&base, s2, d2, i2, e2);

        let changes = diff_card(&old, &new);

        prop_assert_eq!(changes.contains_key("status"), s1 != s2);
        prop_assert_eq!(changes.contains_key("due_at"), d1 != d2);
        prop_assert_eq!(changes.contains_key("interval_days"), i1 != i2);
        prop_assert_eq!(changes.contains_key("ease_factor"), e1 != e2);
        prop_assert!(changes.values().all(|change| change.old != change.new));
        prop_assert!(diff_card(&old, &old).is_empty());
    }
}
