//! Four-button derivative (Again / Hard / Good / Easy).

use chrono::{DateTime, Utc};

use crate::types::{
    clamp_interval, due_after, floor_ease, CardStatus, Grade, GradeScale, Rating, Schedule,
    ScheduleState, MASTERED_INTERVAL_DAYS,
};
use crate::Scheduler;

const AGAIN_EASE_PENALTY: f64 = 0.2;
const HARD_EASE_PENALTY: f64 = 0.15;
const EASY_EASE_BONUS: f64 = 0.15;
const HARD_MULTIPLIER: f64 = 1.2;
const EASY_MULTIPLIER: f64 = 1.3;
const GOOD_SECOND_STEP_DAYS: i32 = 3;
const EASY_FIRST_STEP_DAYS: i32 = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct FourGradeScheduler;

impl FourGradeScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for FourGradeScheduler {
    fn name(&self) -> &'static str {
        "four_grade"
    }

    fn scale(&self) -> GradeScale {
        GradeScale::FourButton
    }

    fn calculate(&self, state: &ScheduleState, grade: Grade, now: DateTime<Utc>) -> Schedule {
        let state = state.normalized();
        let rating = grade.rating();
        let current = state.interval_days;
        let ease = state.ease_factor;

        let (interval_days, ease_factor, mut status) = match rating {
            Rating::Again => (0, floor_ease(ease - AGAIN_EASE_PENALTY), CardStatus::Learning),
            Rating::Hard => {
                let interval = if current == 0 {
                    1
                } else {
                    grow(current, f64::from(current) * HARD_MULTIPLIER)
                };
                (interval, floor_ease(ease - HARD_EASE_PENALTY), CardStatus::Review)
            }
            Rating::Good => {
                let interval = match current {
                    0 => 1,
                    1 => GOOD_SECOND_STEP_DAYS,
                    _ => grow(current, f64::from(current) * ease),
                };
                (interval, ease, CardStatus::Review)
            }
            Rating::Easy => {
                let interval = if current == 0 {
                    EASY_FIRST_STEP_DAYS
                } else {
                    grow(current, f64::from(current) * ease * EASY_MULTIPLIER)
                };
                (interval, ease + EASY_EASE_BONUS, CardStatus::Review)
            }
        };

        if rating != Rating::Again && interval_days >= MASTERED_INTERVAL_DAYS {
            status = CardStatus::Mastered;
        }

        // The first review of a new card only decides between LEARNING and REVIEW.
        if state.is_new() {
            status = if rating == Rating::Again {
                CardStatus::Learning
            } else {
                CardStatus::Review
            };
        }

        let lapses = if rating == Rating::Again {
            state.lapses.saturating_add(1)
        } else {
            state.lapses
        };

        Schedule {
            status,
            due_at: due_after(now, interval_days),
            interval_days,
            ease_factor,
            review_count: state.review_count.saturating_add(1),
            lapses,
        }
    }
}

/// Rounded growth that always moves at least one day forward.
fn grow(current: i32, scaled: f64) -> i32 {
    clamp_interval(scaled.round().max(f64::from(current) + 1.0))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::types::{MAX_INTERVAL_DAYS, MIN_EASE};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 12, 18, 30, 0).unwrap()
    }

    fn state(status: CardStatus, interval_days: i32, ease_factor: f64) -> ScheduleState {
        ScheduleState {
            status,
            interval_days,
            ease_factor,
            review_count: 4,
            lapses: 0,
        }
    }

    fn run(state: &ScheduleState, rating: Rating) -> Schedule {
        FourGradeScheduler.calculate(state, Grade::Button(rating), now())
    }

    #[test]
    fn new_card_good_goes_straight_to_review() {
        let out = run(&ScheduleState::new_card(), Rating::Good);
        assert_eq!(out.status, CardStatus::Review);
        assert_eq!(out.interval_days, 1);
        assert_eq!(out.due_at, now() + Duration::days(1));
    }

    #[test]
    fn new_card_again_goes_to_learning() {
        let out = run(&ScheduleState::new_card(), Rating::Again);
        assert_eq!(out.status, CardStatus::Learning);
        assert_eq!(out.interval_days, 0);
        assert_eq!(out.due_at, now() + Duration::minutes(10));
    }

    #[test]
    fn new_card_easy_jumps_four_days() {
        let out = run(&ScheduleState::new_card(), Rating::Easy);
        assert_eq!(out.status, CardStatus::Review);
        assert_eq!(out.interval_days, 4);
        assert!((out.ease_factor - 2.65).abs() < 1e-9);
    }

    #[test]
    fn again_resets_interval_and_drops_ease() {
        let out = run(&state(CardStatus::Review, 10, 2.0), Rating::Again);
        assert_eq!(out.interval_days, 0);
        assert!((out.ease_factor - 1.8).abs() < 1e-9);
        assert_eq!(out.status, CardStatus::Learning);
        assert_eq!(out.due_at, now() + Duration::minutes(10));
        assert_eq!(out.lapses, 1);
    }

    #[test]
    fn again_floors_ease() {
        let out = run(&state(CardStatus::Review, 10, 1.4), Rating::Again);
        assert_eq!(out.ease_factor, MIN_EASE);
    }

    #[test]
    fn hard_grows_slowly_but_always_grows() {
        let out = run(&state(CardStatus::Review, 10, 2.5), Rating::Hard);
        assert_eq!(out.interval_days, 12);
        assert!((out.ease_factor - 2.35).abs() < 1e-9);

        let out = run(&state(CardStatus::Review, 2, 2.5), Rating::Hard);
        assert_eq!(out.interval_days, 3);
    }

    #[test]
    fn good_uses_fixed_second_step_then_ease() {
        let out = run(&state(CardStatus::Review, 1, 2.5), Rating::Good);
        assert_eq!(out.interval_days, 3);

        let out = run(&state(CardStatus::Review, 3, 2.5), Rating::Good);
        assert_eq!(out.interval_days, 8);
        assert_eq!(out.ease_factor, 2.5);
    }

    #[test]
    fn easy_applies_bonus_multiplier() {
        let out = run(&state(CardStatus::Review, 4, 2.5), Rating::Easy);
        assert_eq!(out.interval_days, 13);
        assert!((out.ease_factor - 2.65).abs() < 1e-9);
    }

    #[test]
    fn long_interval_masters_the_card() {
        let out = run(&state(CardStatus::Review, 10, 2.5), Rating::Good);
        assert_eq!(out.interval_days, 25);
        assert_eq!(out.status, CardStatus::Mastered);
    }

    #[test]
    fn intervals_stop_at_the_ceiling() {
        let out = run(&state(CardStatus::Mastered, MAX_INTERVAL_DAYS, 3.0), Rating::Easy);
        assert_eq!(out.interval_days, MAX_INTERVAL_DAYS);
    }

    #[test]
    fn five_point_scores_map_onto_buttons() {
        let out = FourGradeScheduler.calculate(
            &state(CardStatus::Review, 10, 2.0),
            Grade::Score(1),
            now(),
        );
        assert_eq!(out.status, CardStatus::Learning);
        assert_eq!(out.interval_days, 0);
    }
}
