//! # vocab-srs - spaced-repetition scheduling
//!
//! Pure scheduling functions for vocabulary cards. No I/O and no clocks:
//! callers pass the current state, the user's grade and `now`, and get the
//! next schedule back.
//!
//! ## Modules
//!
//! - [`sm2`] - SuperMemo-2 derivative on a 1-5 quality scale
//! - [`four_grade`] - Again / Hard / Good / Easy derivative
//! - [`snapshot`] - versioned JSON form of the scheduling state
//! - [`types`] - shared value objects and constants
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use vocab_srs::{AlgorithmKind, CardStatus, Grade, Rating, ScheduleState};
//!
//! let scheduler = AlgorithmKind::FourGrade.build();
//! let next = scheduler.calculate(&ScheduleState::new_card(), Grade::Button(Rating::Good), Utc::now());
//! assert_eq!(next.status, CardStatus::Review);
//! assert_eq!(next.interval_days, 1);
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod four_grade;
pub mod sm2;
pub mod snapshot;
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use four_grade::FourGradeScheduler;
pub use sm2::Sm2Scheduler;
pub use snapshot::{
    LegacySnapshot, SchedulerSnapshot, SnapshotError, VersionedSnapshot, SNAPSHOT_VERSION,
};
pub use types::*;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Strategy
// ============================================================================

/// A scheduling policy.
///
/// `calculate` is total: it normalizes the incoming state and maps a grade
/// from the other scale onto its own. Callers that need strict input
/// checking validate against [`Scheduler::scale`] first.
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &'static str;

    fn scale(&self) -> GradeScale;

    fn calculate(&self, state: &ScheduleState, grade: Grade, now: DateTime<Utc>) -> Schedule;
}

/// Which scheduler to build at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlgorithmKind {
    Sm2,
    #[default]
    FourGrade,
}

impl AlgorithmKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            AlgorithmKind::Sm2 => "sm2",
            AlgorithmKind::FourGrade => "four_grade",
        }
    }

    pub fn build(self) -> Arc<dyn Scheduler> {
        match self {
            AlgorithmKind::Sm2 => Arc::new(Sm2Scheduler::new()),
            AlgorithmKind::FourGrade => Arc::new(FourGradeScheduler::new()),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scheduling algorithm: {0} (expected sm2 or four_grade)")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for AlgorithmKind {
    type Err = UnknownAlgorithm;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sm2" | "sm_2" | "supermemo" => Ok(AlgorithmKind::Sm2),
            "four_grade" | "fourgrade" | "anki" => Ok(AlgorithmKind::FourGrade),
            _ => Err(UnknownAlgorithm(value.to_string())),
        }
    }
}
