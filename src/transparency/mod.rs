//! Transparency module for the geofence session agent.
//!
//! Tracks and exposes what the agent did with the location events it
//! received, so users can audit the tracker.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, PersistedStats, SharedTransparencyLog,
    TransparencyLog, TransparencyStats,
};
