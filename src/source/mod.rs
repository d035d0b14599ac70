//! Location event source for the geofence session agent.
//!
//! This module decides which regions are watched and turns boundary
//! crossings reported by the platform into tracker events.

pub mod monitor;
pub mod types;

// Re-export commonly used types
pub use monitor::{
    DeliveryError, LocationPermission, MonitorConfig, MonitorError, RegionMonitor,
    RegionRegistration, DEFAULT_MAX_MONITORED_REGIONS, PROXIMITY_RADIUS_METERS,
    REGION_SEARCH_RADIUS_KM,
};
pub use types::{ProximityEvent, ProximityKind};
