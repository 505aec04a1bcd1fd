//! SuperMemo-2 derivative on a 1-5 quality scale.
//!
//! - quality < 3: the card lapses, interval resets, ease drops by a fixed penalty
//! - quality >= 3: fixed first steps (1 day, then 6 days), afterwards the
//!   interval is multiplied by the ease factor, and ease moves by the SM-2 formula

use chrono::{DateTime, Utc};

use crate::types::{
    clamp_interval, due_after, floor_ease, CardStatus, Grade, GradeScale, Schedule, ScheduleState,
    MASTERED_INTERVAL_DAYS,
};
use crate::Scheduler;

const FAIL_EASE_PENALTY: f64 = 0.2;
const FIRST_STEP_DAYS: i32 = 1;
const SECOND_STEP_DAYS: i32 = 6;

#[derive(Debug, Clone, Copy, Default)]
pub struct Sm2Scheduler;

impl Sm2Scheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for Sm2Scheduler {
    fn name(&self) -> &'static str {
        "sm2"
    }

    fn scale(&self) -> GradeScale {
        GradeScale::FivePoint
    }

    fn calculate(&self, state: &ScheduleState, grade: Grade, now: DateTime<Utc>) -> Schedule {
        let state = state.normalized();
        let quality = grade.quality();
        let review_count = state.review_count.saturating_add(1);

        if quality < 3 {
            return Schedule {
                status: CardStatus::Learning,
                due_at: due_after(now, 0),
                interval_days: 0,
                ease_factor: floor_ease(state.ease_factor - FAIL_EASE_PENALTY),
                review_count,
                lapses: state.lapses.saturating_add(1),
            };
        }

        let interval_days = if state.is_new() || state.interval_days == 0 {
            FIRST_STEP_DAYS
        } else if state.interval_days == 1 {
            SECOND_STEP_DAYS
        } else {
            clamp_interval((f64::from(state.interval_days) * state.ease_factor).ceil())
        };

        // EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))
        let miss = f64::from(5 - quality);
        let ease_factor = floor_ease(state.ease_factor + (0.1 - miss * (0.08 + miss * 0.02)));

        let status = if interval_days >= MASTERED_INTERVAL_DAYS {
            CardStatus::Mastered
        } else if state.is_new() || interval_days < SECOND_STEP_DAYS {
            CardStatus::Learning
        } else {
            CardStatus::Review
        };

        Schedule {
            status,
            due_at: due_after(now, interval_days),
            interval_days,
            ease_factor,
            review_count,
            lapses: state.lapses,
        }
    }
}
