//! Proximity event types.
//!
//! Events carry only the region id and the time of the transition, never the
//! device position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a region boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProximityKind {
    Enter,
    Exit,
}

/// A region boundary crossing reported by the location source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityEvent {
    pub kind: ProximityKind,
    pub region_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ProximityEvent {
    pub fn new(kind: ProximityKind, region_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            region_id: region_id.into(),
            timestamp,
        }
    }

    pub fn enter(region_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(ProximityKind::Enter, region_id, timestamp)
    }

    pub fn exit(region_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(ProximityKind::Exit, region_id, timestamp)
    }
}
