//! Transparency log of tracker activity.
//!
//! Counts what the tracker did with the location events it received, without
//! storing any positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the tracker.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Proximity events received from the monitor
    events_received: AtomicU64,
    /// Events resolved as no-ops (duplicates, unmatched exits, conflicts)
    events_ignored: AtomicU64,
    /// Sessions opened
    sessions_opened: AtomicU64,
    /// Sessions appended to history
    sessions_finalized: AtomicU64,
    /// Sessions dropped by the minimum-duration filter
    sessions_discarded: AtomicU64,
    /// Successful health record pushes
    syncs_succeeded: AtomicU64,
    /// Failed health record pushes
    syncs_failed: AtomicU64,
    /// Run start time
    run_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            sessions_finalized: AtomicU64::new(0),
            sessions_discarded: AtomicU64::new(0),
            syncs_succeeded: AtomicU64::new(0),
            syncs_failed: AtomicU64::new(0),
            run_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_finalized(&self) {
        self.sessions_finalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_discarded(&self) {
        self.sessions_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync(&self, succeeded: bool) {
        if succeeded {
            self.syncs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.syncs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_finalized: self.sessions_finalized.load(Ordering::Relaxed),
            sessions_discarded: self.sessions_discarded.load(Ordering::Relaxed),
            syncs_succeeded: self.syncs_succeeded.load(Ordering::Relaxed),
            syncs_failed: self.syncs_failed.load(Ordering::Relaxed),
            run_start: self.run_start,
            run_duration_secs: (Utc::now() - self.run_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Tracker Statistics:\n\
             - Proximity events received: {}\n\
             - Events ignored: {}\n\
             - Sessions opened: {}\n\
             - Sessions recorded: {}\n\
             - Sessions discarded (too short): {}\n\
             - Health syncs: {} ok, {} failed\n\
             - Run duration: {} seconds\n\
             \n\
             Location Guarantee:\n\
             - Only region enter/exit times are recorded\n\
             - No continuous location trail is stored",
            stats.events_received,
            stats.events_ignored,
            stats.sessions_opened,
            stats.sessions_finalized,
            stats.sessions_discarded,
            stats.syncs_succeeded,
            stats.syncs_failed,
            stats.run_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                events_received: stats.events_received,
                events_ignored: stats.events_ignored,
                sessions_opened: stats.sessions_opened,
                sessions_finalized: stats.sessions_finalized,
                sessions_discarded: stats.sessions_discarded,
                syncs_succeeded: stats.syncs_succeeded,
                syncs_failed: stats.syncs_failed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.events_received
                    .store(persisted.events_received, Ordering::Relaxed);
                self.events_ignored
                    .store(persisted.events_ignored, Ordering::Relaxed);
                self.sessions_opened
                    .store(persisted.sessions_opened, Ordering::Relaxed);
                self.sessions_finalized
                    .store(persisted.sessions_finalized, Ordering::Relaxed);
                self.sessions_discarded
                    .store(persisted.sessions_discarded, Ordering::Relaxed);
                self.syncs_succeeded
                    .store(persisted.syncs_succeeded, Ordering::Relaxed);
                self.syncs_failed
                    .store(persisted.syncs_failed, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub events_received: u64,
    pub events_ignored: u64,
    pub sessions_opened: u64,
    pub sessions_finalized: u64,
    pub sessions_discarded: u64,
    pub syncs_succeeded: u64,
    pub syncs_failed: u64,
    pub run_start: DateTime<Utc>,
    pub run_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub events_received: u64,
    pub events_ignored: u64,
    pub sessions_opened: u64,
    pub sessions_finalized: u64,
    pub sessions_discarded: u64,
    pub syncs_succeeded: u64,
    pub syncs_failed: u64,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
