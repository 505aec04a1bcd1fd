//! Versioned scheduler snapshots.
//!
//! Review logs keep the scheduling state before and after every review as
//! JSON. The current layout (version 2) is a typed record; version 1 was an
//! untyped map with optional numeric fields and is still readable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{clamp_interval, CardStatus, ScheduleState, DEFAULT_EASE};

pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot must be a JSON object")]
    NotAnObject,

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(Value),

    #[error("unknown status in snapshot: {0}")]
    UnknownStatus(String),

    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ==================== Current Layout ====================

/// Scheduling state as persisted alongside a review.
///
/// Always serialized with `"version": 2`; deserialization accepts any
/// readable version and migrates it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "SnapshotV2", try_from = "Value")]
pub struct SchedulerSnapshot {
    pub status: CardStatus,
    pub interval_days: i32,
    pub ease_factor: f64,
    pub review_count: i32,
    pub lapses: i32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotV2 {
    version: u32,
    status: CardStatus,
    interval_days: i32,
    ease_factor: f64,
    review_count: i32,
    #[serde(default)]
    lapses: i32,
}

impl From<SchedulerSnapshot> for SnapshotV2 {
    fn from(s: SchedulerSnapshot) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            status: s.status,
            interval_days: s.interval_days,
            ease_factor: s.ease_factor,
            review_count: s.review_count,
            lapses: s.lapses,
        }
    }
}

impl TryFrom<Value> for SchedulerSnapshot {
    type Error = SnapshotError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        VersionedSnapshot::from_value(value).map(VersionedSnapshot::migrate)
    }
}

impl From<ScheduleState> for SchedulerSnapshot {
    fn from(state: ScheduleState) -> Self {
        Self {
            status: state.status,
            interval_days: state.interval_days,
            ease_factor: state.ease_factor,
            review_count: state.review_count,
            lapses: state.lapses,
        }
    }
}

impl From<SchedulerSnapshot> for ScheduleState {
    fn from(s: SchedulerSnapshot) -> Self {
        ScheduleState {
            status: s.status,
            interval_days: s.interval_days,
            ease_factor: s.ease_factor,
            review_count: s.review_count,
            lapses: s.lapses,
        }
        .normalized()
    }
}

// ==================== Legacy Layout ====================

/// Version 1: free-form map, every field optional, numbers possibly fractional.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LegacySnapshot {
    pub interval: Option<f64>,
    pub ease_factor: Option<f64>,
    pub review_count: Option<f64>,
    pub status: Option<CardStatus>,
}

#[derive(Deserialize)]
struct RawLegacy {
    #[serde(default)]
    interval: Option<f64>,
    #[serde(default)]
    ease_factor: Option<f64>,
    #[serde(default)]
    review_count: Option<f64>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VersionedSnapshot {
    V1(LegacySnapshot),
    V2(SchedulerSnapshot),
}

impl VersionedSnapshot {
    /// Reads any supported version. A map without `"version"` is version 1.
    pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
        let version = match value.as_object() {
            Some(map) => map.get("version").cloned(),
            None => return Err(SnapshotError::NotAnObject),
        };

        match version.as_ref().map(Value::as_u64) {
            None | Some(Some(1)) => {
                let raw: RawLegacy = serde_json::from_value(value)?;
                let status = raw
                    .status
                    .map(|s| s.parse::<CardStatus>().map_err(|e| SnapshotError::UnknownStatus(e.0)))
                    .transpose()?;
                Ok(VersionedSnapshot::V1(LegacySnapshot {
                    interval: raw.interval,
                    ease_factor: raw.ease_factor,
                    review_count: raw.review_count,
                    status,
                }))
            }
            Some(Some(2)) => {
                let v2: SnapshotV2 = serde_json::from_value(value)?;
                Ok(VersionedSnapshot::V2(SchedulerSnapshot {
                    status: v2.status,
                    interval_days: v2.interval_days,
                    ease_factor: v2.ease_factor,
                    review_count: v2.review_count,
                    lapses: v2.lapses,
                }))
            }
            _ => Err(SnapshotError::UnsupportedVersion(
                version.unwrap_or(Value::Null),
            )),
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            VersionedSnapshot::V1(_) => 1,
            VersionedSnapshot::V2(_) => 2,
        }
    }

    /// Upgrades to the current layout, filling gaps with new-card defaults.
    pub fn migrate(self) -> SchedulerSnapshot {
        match self {
            VersionedSnapshot::V2(current) => current,
            VersionedSnapshot::V1(legacy) => {
                let state = ScheduleState {
                    status: legacy.status.unwrap_or(CardStatus::New),
                    interval_days: legacy.interval.map(|d| clamp_interval(d.round())).unwrap_or(0),
                    ease_factor: legacy.ease_factor.unwrap_or(DEFAULT_EASE),
                    review_count: legacy
                        .review_count
                        .filter(|n| n.is_finite())
                        .map(|n| n.max(0.0).min(f64::from(i32::MAX)) as i32)
                        .unwrap_or(0),
                    lapses: 0,
                }
                .normalized();
                state.into()
            }
        }
    }
}
