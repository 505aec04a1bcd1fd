//! Common Types and Constants
//!
//! Value objects passed between the review engine and the schedulers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==================== Constants ====================

/// Ease factor assumed for a card that has never been reviewed
pub const DEFAULT_EASE: f64 = 2.5;

/// Lower bound for the ease factor
pub const MIN_EASE: f64 = 1.3;

/// Upper bound for any scheduled interval (ten years)
pub const MAX_INTERVAL_DAYS: i32 = 3650;

/// Interval at which a passing card is promoted to MASTERED
pub const MASTERED_INTERVAL_DAYS: i32 = 21;

/// Delay before a failed card comes back within the same session
pub const RELEARN_DELAY_MINUTES: i64 = 10;

// ==================== Card Status ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    New,
    Learning,
    Review,
    Mastered,
}

impl CardStatus {
    pub const ALL: [CardStatus; 4] = [
        CardStatus::New,
        CardStatus::Learning,
        CardStatus::Review,
        CardStatus::Mastered,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            CardStatus::New => "NEW",
            CardStatus::Learning => "LEARNING",
            CardStatus::Review => "REVIEW",
            CardStatus::Mastered => "MASTERED",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown card status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CardStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(CardStatus::New),
            "LEARNING" => Ok(CardStatus::Learning),
            "REVIEW" => Ok(CardStatus::Review),
            "MASTERED" => Ok(CardStatus::Mastered),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

// ==================== Grades ====================

/// Four-button self assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub const fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "AGAIN",
            Rating::Hard => "HARD",
            Rating::Good => "GOOD",
            Rating::Easy => "EASY",
        }
    }
}

/// A grade exactly as the user submitted it.
///
/// Either a four-button [`Rating`] or a raw 1-5 quality score. Which form is
/// acceptable depends on the active scheduler's [`GradeScale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grade {
    Button(Rating),
    Score(i32),
}

impl Grade {
    /// Quality on the 0-5 SuperMemo scale.
    pub fn quality(self) -> i32 {
        match self {
            Grade::Button(Rating::Again) => 1,
            Grade::Button(Rating::Hard) => 3,
            Grade::Button(Rating::Good) => 4,
            Grade::Button(Rating::Easy) => 5,
            Grade::Score(q) => q.clamp(0, 5),
        }
    }

    /// Closest four-button rating.
    pub fn rating(self) -> Rating {
        match self {
            Grade::Button(rating) => rating,
            Grade::Score(q) if q <= 2 => Rating::Again,
            Grade::Score(3) => Rating::Hard,
            Grade::Score(4) => Rating::Good,
            Grade::Score(_) => Rating::Easy,
        }
    }

    pub fn is_passing(self) -> bool {
        self.quality() >= 3
    }
}

impl From<Rating> for Grade {
    fn from(rating: Rating) -> Self {
        Grade::Button(rating)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Button(rating) => f.write_str(rating.as_str()),
            Grade::Score(q) => write!(f, "{q}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized grade: {0}")]
pub struct UnknownGrade(pub String);

impl FromStr for Grade {
    type Err = UnknownGrade;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(score) = trimmed.parse::<i32>() {
            return Ok(Grade::Score(score));
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "AGAIN" => Ok(Grade::Button(Rating::Again)),
            "HARD" => Ok(Grade::Button(Rating::Hard)),
            "GOOD" => Ok(Grade::Button(Rating::Good)),
            "EASY" => Ok(Grade::Button(Rating::Easy)),
            _ => Err(UnknownGrade(value.to_string())),
        }
    }
}

/// The set of grades a scheduler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeScale {
    FivePoint,
    FourButton,
}

impl GradeScale {
    pub fn validate(self, grade: Grade) -> Result<Grade, InvalidGrade> {
        match (self, grade) {
            (GradeScale::FivePoint, Grade::Score(q)) if (1..=5).contains(&q) => Ok(grade),
            (GradeScale::FourButton, Grade::Button(_)) => Ok(grade),
            _ => Err(InvalidGrade { grade, scale: self }),
        }
    }

    pub const fn describe(self) -> &'static str {
        match self {
            GradeScale::FivePoint => "an integer from 1 to 5",
            GradeScale::FourButton => "one of AGAIN, HARD, GOOD, EASY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid grade {grade}: expected {}", .scale.describe())]
pub struct InvalidGrade {
    pub grade: Grade,
    pub scale: GradeScale,
}

// ==================== Scheduling State ====================

/// Scheduling state fed into a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleState {
    pub status: CardStatus,
    pub interval_days: i32,
    pub ease_factor: f64,
    pub review_count: i32,
    pub lapses: i32,
}

impl ScheduleState {
    pub fn new_card() -> Self {
        Self {
            status: CardStatus::New,
            interval_days: 0,
            ease_factor: DEFAULT_EASE,
            review_count: 0,
            lapses: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        self.status == CardStatus::New
    }

    /// Copy with every field pulled back into its valid range.
    pub fn normalized(&self) -> Self {
        let ease_factor = if self.ease_factor.is_finite() {
            self.ease_factor.max(MIN_EASE)
        } else {
            DEFAULT_EASE
        };

        Self {
            status: self.status,
            interval_days: self.interval_days.clamp(0, MAX_INTERVAL_DAYS),
            ease_factor,
            review_count: self.review_count.max(0),
            lapses: self.lapses.max(0),
        }
    }
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self::new_card()
    }
}

/// Result of one scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub status: CardStatus,
    pub due_at: DateTime<Utc>,
    pub interval_days: i32,
    pub ease_factor: f64,
    pub review_count: i32,
    pub lapses: i32,
}

impl Schedule {
    pub fn state(&self) -> ScheduleState {
        ScheduleState {
            status: self.status,
            interval_days: self.interval_days,
            ease_factor: self.ease_factor,
            review_count: self.review_count,
            lapses: self.lapses,
        }
    }
}

// ==================== Helpers ====================

pub(crate) fn floor_ease(ease: f64) -> f64 {
    ease.max(MIN_EASE)
}

/// Converts a computed interval into whole days within bounds.
pub(crate) fn clamp_interval(days: f64) -> i32 {
    if !days.is_finite() {
        return MAX_INTERVAL_DAYS;
    }
    days.clamp(0.0, f64::from(MAX_INTERVAL_DAYS)) as i32
}

/// A zero interval means "again in this session". Saturates at the latest
/// representable instant instead of overflowing.
pub(crate) fn due_after(now: DateTime<Utc>, interval_days: i32) -> DateTime<Utc> {
    let delay = if interval_days <= 0 {
        Duration::minutes(RELEARN_DELAY_MINUTES)
    } else {
        Duration::days(i64::from(interval_days))
    };
    now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_after_saturates_near_the_end_of_time() {
        let late = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        assert_eq!(due_after(late, MAX_INTERVAL_DAYS), DateTime::<Utc>::MAX_UTC);
        assert_eq!(due_after(late, 0), late + Duration::minutes(RELEARN_DELAY_MINUTES));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("learning".parse::<CardStatus>(), Ok(CardStatus::Learning));
        assert_eq!(" MASTERED ".parse::<CardStatus>(), Ok(CardStatus::Mastered));
        assert!("DONE".parse::<CardStatus>().is_err());
    }

    #[test]
    fn grade_round_trips_through_display() {
        for grade in [
            Grade::Button(Rating::Again),
            Grade::Button(Rating::Easy),
            Grade::Score(1),
            Grade::Score(5),
        ] {
            assert_eq!(grade.to_string().parse::<Grade>(), Ok(grade));
        }
    }

    #[test]
    fn grade_deserializes_from_label_or_number() {
        let label: Grade = serde_json::from_str("\"HARD\"").unwrap();
        assert_eq!(label, Grade::Button(Rating::Hard));

        let score: Grade = serde_json::from_str("4").unwrap();
        assert_eq!(score, Grade::Score(4));
    }

    #[test]
    fn scales_reject_foreign_grades() {
        assert!(GradeScale::FivePoint.validate(Grade::Score(3)).is_ok());
        assert!(GradeScale::FivePoint.validate(Grade::Score(0)).is_err());
        assert!(GradeScale::FivePoint.validate(Grade::Score(6)).is_err());
        assert!(GradeScale::FivePoint
            .validate(Grade::Button(Rating::Good))
            .is_err());

        assert!(GradeScale::FourButton
            .validate(Grade::Button(Rating::Again))
            .is_ok());
        assert!(GradeScale::FourButton.validate(Grade::Score(4)).is_err());
    }

    #[test]
    fn invalid_grade_message_names_the_scale() {
        let err = GradeScale::FourButton.validate(Grade::Score(7)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid grade 7: expected one of AGAIN, HARD, GOOD, EASY"
        );
    }

    #[test]
    fn quality_and_rating_agree_on_pass_fail() {
        for q in 1..=5 {
            let grade = Grade::Score(q);
            assert_eq!(grade.is_passing(), grade.rating() != Rating::Again);
        }
    }

    #[test]
    fn normalized_repairs_out_of_range_state() {
        let broken = ScheduleState {
            status: CardStatus::Review,
            interval_days: -4,
            ease_factor: f64::NAN,
            review_count: -1,
            lapses: -2,
        };
        let fixed = broken.normalized();
        assert_eq!(fixed.interval_days, 0);
        assert_eq!(fixed.ease_factor, DEFAULT_EASE);
        assert_eq!(fixed.review_count, 0);
        assert_eq!(fixed.lapses, 0);

        let low = ScheduleState {
            ease_factor: 0.4,
            ..ScheduleState::new_card()
        };
        assert_eq!(low.normalized().ease_factor, MIN_EASE);
    }

    #[test]
    fn zero_interval_is_due_within_the_session() {
        let now = Utc::now();
        assert_eq!(due_after(now, 0), now + Duration::minutes(10));
        assert_eq!(due_after(now, 3), now + Duration::days(3));
    }
}
