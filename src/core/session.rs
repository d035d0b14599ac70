//! Session record shared by the tracker, store and aggregator.

use crate::core::region::{Coordinates, TrackableRegion};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a finalized session has reached the health record sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
}

/// One continuous interval of presence at a region.
///
/// A session is open while `end` is `None`. Once finalized and appended to
/// history only `sync_status` may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub region_id: String,
    pub region_label: String,
    pub activity_type: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub origin: Coordinates,
    pub estimated_energy: Option<u32>,
    pub sync_status: SyncStatus,
}

impl Session {
    /// Open a new session at `region` starting at `start`.
    pub fn open(region: &TrackableRegion, start: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            region_id: region.id.clone(),
            region_label: region.label.clone(),
            activity_type: region.activity_type.clone(),
            start,
            end: None,
            origin: region.coordinates,
            estimated_energy: None,
            sync_status: SyncStatus::Pending,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Elapsed time from start to end, or to `now` while open.
    pub fn duration_until(&self, now: DateTime<Utc>) -> Duration {
        self.end.unwrap_or(now) - self.start
    }

    /// Duration of a finalized session. Zero while open.
    pub fn duration(&self) -> Duration {
        self.end.map(|end| end - self.start).unwrap_or_else(Duration::zero)
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration().num_seconds() as f64 / 60.0
    }
}
