//! Core functionality for the geofence session agent.
//!
//! This module contains:
//! - The region registry and radius filtering
//! - The session model and lifecycle state machine
//! - Energy estimation and weekly aggregation

pub mod aggregate;
pub mod lifecycle;
pub mod metric;
pub mod region;
pub mod session;

// Re-export commonly used types
pub use aggregate::{weekly_stats, WeeklyAggregate};
pub use lifecycle::{
    min_session_duration, ConflictPolicy, IgnoreReason, SessionTracker, SyncReport, TrackerError,
    TrackerOptions, Transition, MIN_SESSION_DURATION_MINUTES,
};
pub use metric::{estimate, met_for, DEFAULT_BODY_MASS_KG};
pub use region::{
    fallback_regions, filter_by_radius, load_regions, select_for_monitoring, Coordinates,
    DirectoryError, DirectoryRegion, JsonFileDirectory, OfflineDirectory, RegionDirectory,
    TrackableRegion,
};
pub use session::{Session, SyncStatus};
