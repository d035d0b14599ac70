//! Geofence Session Agent - activity sessions from region enter/exit events.
//!
//! This library turns a stream of proximity events for known venues (courts,
//! gyms, pools) into activity sessions with an energy estimate, keeps the
//! in-flight session and a bounded history on durable storage, and reports
//! weekly aggregates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Geofence Session Agent                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐   │
//! │  │ Regions  │──▶│ Monitor  │──▶│  Router  │──▶│   Tracker    │   │
//! │  │(registry)│   │ (source) │   │ (queue)  │   │(state machine)│  │
//! │  └──────────┘   └──────────┘   └──────────┘   └──────┬───────┘   │
//! │                                                       │          │
//! │                    ┌──────────────┬───────────────────┤          │
//! │                    ▼              ▼                   ▼          │
//! │             ┌────────────┐ ┌────────────┐     ┌──────────────┐   │
//! │             │   Store    │ │   Metric   │     │ Health sink  │   │
//! │             │(slot+log)  │ │   (MET)    │     │  (gateway)   │   │
//! │             └─────┬──────┘ └────────────┘     └──────────────┘   │
//! │                   ▼                                              │
//! │             ┌────────────┐                                       │
//! │             │ Aggregate  │                                       │
//! │             └────────────┘                                       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::{Duration, Utc};
//! use geofence_session_agent::{
//!     core::{fallback_regions, weekly_stats, SessionTracker, TrackerOptions},
//!     store::{MemoryBackend, StateStore},
//! };
//!
//! let store = StateStore::new(Arc::new(MemoryBackend::new()));
//! let mut tracker = SessionTracker::restore(store.clone(), TrackerOptions::default())
//!     .with_regions(fallback_regions());
//!
//! let start = Utc::now() - Duration::minutes(30);
//! tracker.handle_enter("court_1", start);
//! tracker.handle_exit("court_1", Utc::now());
//!
//! let stats = weekly_stats(&store.history().unwrap(), Utc::now());
//! println!("{} sessions this week", stats.session_count);
//! ```

pub mod config;
pub mod core;
pub mod gateway;
pub mod router;
pub mod source;
pub mod store;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    weekly_stats, Coordinates, Session, SessionTracker, SyncStatus, TrackableRegion,
    TrackerOptions, Transition, WeeklyAggregate,
};
pub use gateway::{GatewayConfig, GatewayError, HealthSink};
pub use router::{ProximityRouter, RouterHandle, TrackerCommand};
pub use source::{ProximityEvent, ProximityKind, RegionMonitor};
pub use store::{FileBackend, KeyValueBackend, MemoryBackend, StateStore};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

// Gateway client re-exports (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::{BlockingGatewayClient, GatewayClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Location declaration that can be displayed to users.
pub const LOCATION_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║          GEOFENCE SESSION AGENT - LOCATION DECLARATION           ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent records activity sessions at venues you visit.       ║
║                                                                  ║
║  ✓ WHAT WE RECORD:                                               ║
║    • When you enter and leave a monitored venue                  ║
║    • The venue's name, activity type and location                ║
║    • An estimated energy expenditure for each session            ║
║                                                                  ║
║  ✗ WHAT WE NEVER RECORD:                                         ║
║    • A continuous trail of your position                         ║
║    • Visits shorter than 15 minutes                              ║
║    • Anything about venues outside the monitored set             ║
║                                                                  ║
║  Sessions are stored locally (last 100 kept). Health sync        ║
║  sends the session id, device id, timezone, activity type,       ║
║  start/end times, duration and energy. Venue names and           ║
║  positions are never sent.                                       ║
║                                                                  ║
║  You can view tracker statistics anytime with:                   ║
║    geofence-session status                                       ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_declaration_contents() {
        assert!(LOCATION_DECLARATION.contains("LOCATION"));
        assert!(LOCATION_DECLARATION.contains("NEVER RECORD"));
        assert!(LOCATION_DECLARATION.contains("15 minutes"));
        assert!(LOCATION_DECLARATION.contains("positions are never sent"));
    }
}
