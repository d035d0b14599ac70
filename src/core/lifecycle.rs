//! Session lifecycle state machine.
//!
//! The tracker owns the single open session (if any) and applies proximity
//! transitions to it:
//!
//! ```text
//!            Enter(r)                    Exit(r), >= 15 min
//!   ┌──────┐ ───────▶ ┌──────────────┐ ──────────────────▶ history + sync
//!   │ Idle │          │ Active(r)    │
//!   └──────┘ ◀─────── └──────────────┘ ──────────────────▶ discarded
//!                Exit(r)      │  ▲         Exit(r), < 15 min
//!                             └──┘
//!                   Enter(r) / Enter(r') / Exit(r')
//! ```
//!
//! Every open session is written to the store before the transition returns,
//! so a restart resumes the session with its original start time.

use crate::core::metric::{estimate, DEFAULT_BODY_MASS_KG};
use crate::core::region::TrackableRegion;
use crate::core::session::{Session, SyncStatus};
use crate::gateway::HealthSink;
use crate::store::{StateStore, StoreError};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Shortest presence that counts as a session.
pub const MIN_SESSION_DURATION_MINUTES: i64 = 15;

pub fn min_session_duration() -> Duration {
    Duration::minutes(MIN_SESSION_DURATION_MINUTES)
}

/// What to do with an Enter for a different region while a session is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the open session; the new entry is ignored.
    #[default]
    IgnoreNew,
    /// Close the open session at the new entry time and open the new region.
    ReplaceOpen,
}

/// Why an event did not change state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Enter for the region that already has the open session
    DuplicateEnter,
    /// Enter for another region while a session is open
    ConflictingRegion { open_region_id: String },
    /// Exit without a matching open session
    UnmatchedExit,
    /// Region id is not in the loaded registry
    UnknownRegion,
}

/// Result of applying one event to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Idle -> Active
    Opened(Session),
    /// Active -> Idle, session recorded in history
    Finalized(Session),
    /// Active -> Idle, session shorter than the minimum and dropped
    Discarded { session: Session, duration: Duration },
    /// Conflict resolved by closing the open session and opening a new one
    Replaced {
        closed: Box<Transition>,
        opened: Session,
    },
    /// Open session closed for a new entry, but the new session could not be persisted
    ReplaceFailed {
        closed: Box<Transition>,
        reason: String,
    },
    /// No state change
    Ignored(IgnoreReason),
    /// Persistence failed; state is unchanged
    Dropped(String),
}

/// Errors returned by manual check-in/check-out.
#[derive(Debug)]
pub enum TrackerError {
    AlreadyActive { region_id: String },
    NoActiveSession,
    UnknownRegion(String),
    Store(StoreError),
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::AlreadyActive { region_id } => {
                write!(f, "A session is already open at '{region_id}'")
            }
            TrackerError::NoActiveSession => write!(f, "No session is open"),
            TrackerError::UnknownRegion(id) => write!(f, "Unknown region '{id}'"),
            TrackerError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<StoreError> for TrackerError {
    fn from(e: StoreError) -> Self {
        TrackerError::Store(e)
    }
}

/// Outcome of a pending-sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Tracker options.
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub body_mass_kg: f64,
    pub conflict_policy: ConflictPolicy,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            body_mass_kg: DEFAULT_BODY_MASS_KG,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

/// Owns the open session and drives Idle/Active transitions.
///
/// Methods take `&mut self`; callers serialize transitions by owning the
/// tracker on a single event loop.
pub struct SessionTracker {
    store: StateStore,
    sink: Option<Box<dyn HealthSink>>,
    options: TrackerOptions,
    regions: HashMap<String, TrackableRegion>,
    active: Option<Session>,
    log: SharedTransparencyLog,
}

impl SessionTracker {
    /// Build a tracker, resuming any open session found in `store`.
    ///
    /// An unreadable open-session slot is logged and the tracker starts Idle.
    /// A slot whose session already reached history is cleared.
    pub fn restore(store: StateStore, options: TrackerOptions) -> Self {
        let active = match store.load_active() {
            Ok(Some(session)) => Self::check_restored(&store, session),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Could not read open session, starting idle: {e}");
                None
            }
        };

        if let Some(ref session) = active {
            tracing::info!(
                region = %session.region_id,
                start = %session.start,
                "Resumed open session"
            );
        }

        Self {
            store,
            sink: None,
            options,
            regions: HashMap::new(),
            active,
            log: create_shared_log(),
        }
    }

    fn check_restored(store: &StateStore, session: Session) -> Option<Session> {
        let recorded = store
            .history()
            .map(|h| h.iter().any(|s| s.id == session.id))
            .unwrap_or(false);

        if recorded {
            tracing::warn!(id = %session.id, "Open session already in history, clearing slot");
            if let Err(e) = store.clear_active() {
                tracing::warn!("Could not clear stale open session: {e}");
            }
            None
        } else {
            Some(session)
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn HealthSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_transparency_log(mut self, log: SharedTransparencyLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_regions(mut self, regions: Vec<TrackableRegion>) -> Self {
        self.set_regions(regions);
        self
    }

    /// Replace the region index for a new monitoring cycle.
    ///
    /// The open session keeps the label and activity it was opened with.
    pub fn set_regions(&mut self, regions: Vec<TrackableRegion>) {
        self.regions = regions.into_iter().map(|r| (r.id.clone(), r)).collect();
    }

    pub fn region(&self, id: &str) -> Option<&TrackableRegion> {
        self.regions.get(id)
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn transparency_log(&self) -> &SharedTransparencyLog {
        &self.log
    }

    /// Persist the transparency counters and release the tracker.
    pub fn finish(self) -> std::io::Result<()> {
        self.log.save()
    }

    /// Apply an Enter event.
    pub fn handle_enter(&mut self, region_id: &str, at: DateTime<Utc>) -> Transition {
        self.log.record_event_received();

        let transition = match self.active.as_ref() {
            Some(open) if open.region_id == region_id => {
                Transition::Ignored(IgnoreReason::DuplicateEnter)
            }
            Some(open) => {
                let open_region_id = open.region_id.clone();
                self.resolve_conflict(open_region_id, region_id, at)
            }
            None => match self.regions.get(region_id).cloned() {
                Some(region) => self.open(&region, at),
                None => Transition::Ignored(IgnoreReason::UnknownRegion),
            },
        };

        self.note(&transition, region_id);
        transition
    }

    /// Apply an Exit event.
    pub fn handle_exit(&mut self, region_id: &str, at: DateTime<Utc>) -> Transition {
        self.log.record_event_received();

        let transition = match self.active.as_ref() {
            Some(open) if open.region_id == region_id => self.close(at),
            _ => Transition::Ignored(IgnoreReason::UnmatchedExit),
        };

        self.note(&transition, region_id);
        transition
    }

    /// Open a session without a proximity event.
    pub fn start_manual_session(
        &mut self,
        region_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Session, TrackerError> {
        if let Some(open) = self.active.as_ref() {
            return Err(TrackerError::AlreadyActive {
                region_id: open.region_id.clone(),
            });
        }

        let region = self
            .regions
            .get(region_id)
            .cloned()
            .ok_or_else(|| TrackerError::UnknownRegion(region_id.to_string()))?;

        let session = Session::open(&region, at);
        self.store.save_active(&session)?;
        self.active = Some(session.clone());
        self.log.record_session_opened();
        tracing::info!(region = %region_id, "Manual session started");

        Ok(session)
    }

    /// Close the open session without a proximity event.
    ///
    /// Returns `Finalized` or `Discarded` exactly as an Exit would.
    pub fn end_manual_session(&mut self, at: DateTime<Utc>) -> Result<Transition, TrackerError> {
        let Some(region_id) = self.active.as_ref().map(|s| s.region_id.clone()) else {
            return Err(TrackerError::NoActiveSession);
        };

        match self.close(at) {
            Transition::Dropped(reason) => Err(TrackerError::Store(StoreError::Backend(reason))),
            transition => {
                self.note(&transition, &region_id);
                Ok(transition)
            }
        }
    }

    /// Re-submit every history entry still marked pending.
    pub fn sync_pending(&mut self) -> Result<SyncReport, TrackerError> {
        let mut report = SyncReport::default();
        if self.sink.is_none() {
            return Ok(report);
        }

        for session in self.store.pending_sync()? {
            report.attempted += 1;
            if self.push(&session) {
                report.synced += 1;
            } else {
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// Single decision point for Enter while another region is open.
    fn resolve_conflict(
        &mut self,
        open_region_id: String,
        region_id: &str,
        at: DateTime<Utc>,
    ) -> Transition {
        match self.options.conflict_policy {
            ConflictPolicy::IgnoreNew => {
                Transition::Ignored(IgnoreReason::ConflictingRegion { open_region_id })
            }
            ConflictPolicy::ReplaceOpen => {
                let Some(region) = self.regions.get(region_id).cloned() else {
                    return Transition::Ignored(IgnoreReason::UnknownRegion);
                };
                let closed = self.close(at);
                if let Transition::Dropped(_) = closed {
                    return closed;
                }
                self.note(&closed, &open_region_id);
                match self.open(&region, at) {
                    Transition::Opened(opened) => Transition::Replaced {
                        closed: Box::new(closed),
                        opened,
                    },
                    Transition::Dropped(reason) => Transition::ReplaceFailed {
                        closed: Box::new(closed),
                        reason,
                    },
                    other => other,
                }
            }
        }
    }

    fn open(&mut self, region: &TrackableRegion, at: DateTime<Utc>) -> Transition {
        let session = Session::open(region, at);
        if let Err(e) = self.store.save_active(&session) {
            return Transition::Dropped(format!("could not persist open session: {e}"));
        }
        self.active = Some(session.clone());
        Transition::Opened(session)
    }

    fn close(&mut self, at: DateTime<Utc>) -> Transition {
        let Some(open) = self.active.clone() else {
            return Transition::Ignored(IgnoreReason::UnmatchedExit);
        };

        let duration = at - open.start;
        if duration < min_session_duration() {
            if let Err(e) = self.store.clear_active() {
                tracing::warn!("Could not clear discarded session slot: {e}");
            }
            self.active = None;
            return Transition::Discarded {
                session: open,
                duration,
            };
        }

        let mut session = open;
        session.end = Some(at);
        session.estimated_energy = Some(estimate(
            &session.activity_type,
            session.duration_minutes(),
            self.options.body_mass_kg,
        ));
        session.sync_status = SyncStatus::Pending;

        match self.store.append_history(session.clone()) {
            Ok(evicted) => {
                for old in evicted {
                    tracing::debug!(id = %old.id, "Evicted oldest history entry");
                }
            }
            Err(e) => return Transition::Dropped(format!("could not append history: {e}")),
        }

        if let Err(e) = self.store.clear_active() {
            tracing::warn!("Could not clear open session slot: {e}");
        }
        self.active = None;

        if self.push(&session) {
            session.sync_status = SyncStatus::Synced;
        }

        Transition::Finalized(session)
    }

    /// Best-effort push to the sink. Returns true if the session is now synced.
    fn push(&self, session: &Session) -> bool {
        let Some(ref sink) = self.sink else {
            return false;
        };

        match sink.submit_session(session) {
            Ok(()) => {
                self.log.record_sync(true);
                if let Err(e) = self.store.set_sync_status(session.id, SyncStatus::Synced) {
                    tracing::warn!(id = %session.id, "Synced but could not update history: {e}");
                }
                true
            }
            Err(e) => {
                self.log.record_sync(false);
                tracing::warn!(id = %session.id, "Health sync failed, left pending: {e}");
                false
            }
        }
    }

    /// Log and count a transition.
    fn note(&self, transition: &Transition, region_id: &str) {
        match transition {
            Transition::Opened(session) => {
                self.log.record_session_opened();
                tracing::info!(region = %region_id, start = %session.start, "Session opened");
            }
            Transition::Finalized(session) => {
                self.log.record_session_finalized();
                tracing::info!(
                    region = %region_id,
                    minutes = session.duration().num_minutes(),
                    energy = session.estimated_energy.unwrap_or(0),
                    "Session recorded"
                );
            }
            Transition::Discarded { duration, .. } => {
                self.log.record_session_discarded();
                tracing::info!(
                    region = %region_id,
                    seconds = duration.num_seconds(),
                    "Session shorter than minimum, discarded"
                );
            }
            Transition::Replaced { opened, .. } => {
                self.log.record_session_opened();
                tracing::info!(region = %opened.region_id, "Session replaced by new entry");
            }
            Transition::Ignored(reason) => {
                self.log.record_event_ignored();
                tracing::warn!(region = %region_id, ?reason, "Event ignored");
            }
            Transition::Dropped(reason) => {
                tracing::error!(region = %region_id, "Event dropped: {reason}");
            }
            Transition::ReplaceFailed { reason, .. } => {
                tracing::error!(region = %region_id, "Entry dropped after closing open session: {reason}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::store::{KeyValueBackend, MemoryBackend};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingSink {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl HealthSink for RecordingSink {
        fn submit_session(&self, _session: &Session) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(GatewayError::Network("offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Backend whose writes can be switched off.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_writes: AtomicBool,
        fail_slot_writes: AtomicBool,
    }

    impl KeyValueBackend for FlakyBackend {
        fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Io("disk full".to_string()));
            }
            if key.ends_with(".active_session") && self.fail_slot_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Io("disk full".to_string()));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    fn regions() -> Vec<TrackableRegion> {
        vec![
            TrackableRegion::new("court_1", "Mission Court", "basketball", 37.76, -122.41),
            TrackableRegion::new("court_2", "Dolores Tennis", "tennis", 37.76, -122.43),
        ]
    }

    fn tracker() -> (SessionTracker, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let store = StateStore::new(Arc::new(MemoryBackend::new()));
        let tracker = SessionTracker::restore(store, TrackerOptions::default())
            .with_regions(regions())
            .with_sink(Box::new(sink.clone()));
        (tracker, sink)
    }

    fn t0() -> DateTime<Utc> {
        Utc::now() - Duration::hours(1)
    }

    #[test]
    fn test_enter_exit_records_session() {
        let (mut tracker, sink) = tracker();
        let start = t0();

        assert!(matches!(
            tracker.handle_enter("court_1", start),
            Transition::Opened(_)
        ));
        assert!(tracker.store().load_active().unwrap().is_some());

        let transition = tracker.handle_exit("court_1", start + Duration::minutes(20));
        let Transition::Finalized(session) = transition else {
            panic!("expected finalized, got {transition:?}");
        };

        assert_eq!(session.estimated_energy, Some(187));
        assert_eq!(session.duration(), Duration::minutes(20));
        assert_eq!(session.sync_status, SyncStatus::Synced);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        let history = tracker.store().history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sync_status, SyncStatus::Synced);
        assert!(tracker.store().load_active().unwrap().is_none());
        assert!(!tracker.is_active());
    }

    #[test]
    fn test_short_session_discarded() {
        let (mut tracker, sink) = tracker();
        let start = t0();

        tracker.handle_enter("court_2", start);
        let transition = tracker.handle_exit("court_2", start + Duration::minutes(5));

        assert!(matches!(transition, Transition::Discarded { .. }));
        assert!(tracker.store().history().unwrap().is_empty());
        assert!(tracker.store().load_active().unwrap().is_none());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_exactly_minimum_duration_is_kept() {
        let (mut tracker, _) = tracker();
        let start = t0();

        tracker.handle_enter("court_1", start);
        let transition = tracker.handle_exit("court_1", start + min_session_duration());
        assert!(matches!(transition, Transition::Finalized(_)));
    }

    #[test]
    fn test_duplicate_enter_is_noop() {
        let (mut tracker, _) = tracker();
        let start = t0();

        let Transition::Opened(first) = tracker.handle_enter("court_1", start) else {
            panic!("expected open");
        };
        let again = tracker.handle_enter("court_1", start + Duration::minutes(3));

        assert_eq!(again, Transition::Ignored(IgnoreReason::DuplicateEnter));
        assert_eq!(tracker.active_session().map(|s| s.start), Some(first.start));
        assert_eq!(tracker.active_session().map(|s| s.id), Some(first.id));
    }

    #[test]
    fn test_conflicting_enter_is_ignored_by_default() {
        let (mut tracker, _) = tracker();
        let start = t0();

        tracker.handle_enter("court_1", start);
        let transition = tracker.handle_enter("court_2", start + Duration::minutes(1));

        assert_eq!(
            transition,
            Transition::Ignored(IgnoreReason::ConflictingRegion {
                open_region_id: "court_1".to_string()
            })
        );
        assert_eq!(
            tracker.active_session().map(|s| s.region_id.as_str()),
            Some("court_1")
        );

        // exit from the ignored region does not close the open one
        let exit = tracker.handle_exit("court_2", start + Duration::minutes(30));
        assert_eq!(exit, Transition::Ignored(IgnoreReason::UnmatchedExit));
        assert!(tracker.is_active());
    }

    #[test]
    fn test_replace_policy_closes_open_session() {
        let store = StateStore::new(Arc::new(MemoryBackend::new()));
        let options = TrackerOptions {
            conflict_policy: ConflictPolicy::ReplaceOpen,
            ..TrackerOptions::default()
        };
        let mut tracker = SessionTracker::restore(store, options).with_regions(regions());
        let start = t0();

        tracker.handle_enter("court_1", start);
        let transition = tracker.handle_enter("court_2", start + Duration::minutes(30));

        let Transition::Replaced { closed, opened } = transition else {
            panic!("expected replace, got {transition:?}");
        };
        assert!(matches!(*closed, Transition::Finalized(_)));
        assert_eq!(opened.region_id, "court_2");
        assert_eq!(tracker.store().history().unwrap().len(), 1);
        assert_eq!(
            tracker.store().load_active().unwrap().map(|s| s.region_id),
            Some("court_2".to_string())
        );
    }

    #[test]
    fn test_replace_keeps_closed_session_when_new_open_fails() {
        let backend = Arc::new(FlakyBackend::default());
        let store = StateStore::new(backend.clone());
        let options = TrackerOptions {
            conflict_policy: ConflictPolicy::ReplaceOpen,
            ..TrackerOptions::default()
        };
        let mut tracker = SessionTracker::restore(store, options).with_regions(regions());
        let start = t0();

        tracker.handle_enter("court_1", start);
        backend.fail_slot_writes.store(true, Ordering::SeqCst);
        let transition = tracker.handle_enter("court_2", start + Duration::minutes(30));

        let Transition::ReplaceFailed { closed, .. } = transition else {
            panic!("expected failed replace, got {transition:?}");
        };
        let Transition::Finalized(session) = *closed else {
            panic!("expected the open session to be recorded");
        };
        assert_eq!(session.region_id, "court_1");
        assert!(!tracker.is_active());
        assert_eq!(tracker.store().history().unwrap().len(), 1);
        assert!(tracker.store().load_active().unwrap().is_none());
        assert_eq!(tracker.transparency_log().stats().sessions_finalized, 1);
    }

    #[test]
    fn test_unmatched_exit_ignored() {
        let (mut tracker, _) = tracker();
        let transition = tracker.handle_exit("court_1", t0());
        assert_eq!(transition, Transition::Ignored(IgnoreReason::UnmatchedExit));
        assert_eq!(tracker.transparency_log().stats().events_ignored, 1);
    }

    #[test]
    fn test_unknown_region_ignored() {
        let (mut tracker, _) = tracker();
        let transition = tracker.handle_enter("nowhere", t0());
        assert_eq!(transition, Transition::Ignored(IgnoreReason::UnknownRegion));
        assert!(!tracker.is_active());
    }

    #[test]
    fn test_sync_failure_keeps_history() {
        let (mut tracker, sink) = tracker();
        sink.fail.store(true, Ordering::SeqCst);
        let start = t0();

        tracker.handle_enter("court_1", start);
        let Transition::Finalized(session) =
            tracker.handle_exit("court_1", start + Duration::minutes(30))
        else {
            panic!("expected finalized");
        };

        assert_eq!(session.sync_status, SyncStatus::Pending);
        let history = tracker.store().history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sync_status, SyncStatus::Pending);

        // future sessions still work
        assert!(matches!(
            tracker.handle_enter("court_2", start + Duration::minutes(31)),
            Transition::Opened(_)
        ));
    }

    #[test]
    fn test_sync_pending_retries() {
        let (mut tracker, sink) = tracker();
        sink.fail.store(true, Ordering::SeqCst);
        let start = t0();

        tracker.handle_enter("court_1", start);
        tracker.handle_exit("court_1", start + Duration::minutes(30));

        sink.fail.store(false, Ordering::SeqCst);
        let report = tracker.sync_pending().unwrap();
        assert_eq!(
            report,
            SyncReport {
                attempted: 1,
                synced: 1,
                failed: 0
            }
        );
        assert!(tracker.store().pending_sync().unwrap().is_empty());
    }

    #[test]
    fn test_manual_session_lifecycle() {
        let (mut tracker, _) = tracker();
        let start = t0();

        let session = tracker.start_manual_session("court_1", start).unwrap();
        assert_eq!(tracker.store().load_active().unwrap(), Some(session));

        let err = tracker
            .start_manual_session("court_2", start + Duration::minutes(1))
            .unwrap_err();
        assert!(matches!(err, TrackerError::AlreadyActive { .. }));

        let transition = tracker
            .end_manual_session(start + Duration::minutes(45))
            .unwrap();
        let Transition::Finalized(done) = transition else {
            panic!("expected finalized");
        };
        assert_eq!(done.region_id, "court_1");
        assert!(done.estimated_energy.is_some());

        assert!(matches!(
            tracker.end_manual_session(start + Duration::minutes(50)),
            Err(TrackerError::NoActiveSession)
        ));
    }

    #[test]
    fn test_manual_start_blocked_by_geofence_session() {
        let (mut tracker, _) = tracker();
        tracker.handle_enter("court_1", t0());
        assert!(matches!(
            tracker.start_manual_session("court_1", t0()),
            Err(TrackerError::AlreadyActive { .. })
        ));
    }

    #[test]
    fn test_manual_unknown_region() {
        let (mut tracker, _) = tracker();
        assert!(matches!(
            tracker.start_manual_session("nowhere", t0()),
            Err(TrackerError::UnknownRegion(_))
        ));
    }

    #[test]
    fn test_restore_resumes_open_session() {
        let backend = Arc::new(MemoryBackend::new());
        let start = t0();

        {
            let store = StateStore::new(backend.clone());
            let mut tracker =
                SessionTracker::restore(store, TrackerOptions::default()).with_regions(regions());
            tracker.handle_enter("court_1", start);
        }

        let store = StateStore::new(backend);
        let mut tracker =
            SessionTracker::restore(store, TrackerOptions::default()).with_regions(regions());
        assert_eq!(tracker.active_session().map(|s| s.start), Some(start));

        let Transition::Finalized(session) =
            tracker.handle_exit("court_1", start + Duration::minutes(40))
        else {
            panic!("expected finalized");
        };
        assert_eq!(session.duration(), Duration::minutes(40));
    }

    #[test]
    fn test_restore_clears_slot_already_in_history() {
        let store = StateStore::new(Arc::new(MemoryBackend::new()));
        let regions = regions();
        let mut session = Session::open(&regions[0], t0());
        store.save_active(&session).unwrap();
        session.end = Some(t0() + Duration::minutes(20));
        store.append_history(session).unwrap();

        let tracker = SessionTracker::restore(store, TrackerOptions::default());
        assert!(!tracker.is_active());
        assert!(tracker.store().load_active().unwrap().is_none());
    }

    #[test]
    fn test_enter_dropped_when_store_fails() {
        let backend = Arc::new(FlakyBackend::default());
        backend.fail_writes.store(true, Ordering::SeqCst);
        let store = StateStore::new(backend.clone());
        let mut tracker =
            SessionTracker::restore(store, TrackerOptions::default()).with_regions(regions());

        assert!(matches!(
            tracker.handle_enter("court_1", t0()),
            Transition::Dropped(_)
        ));
        assert!(!tracker.is_active());
    }

    #[test]
    fn test_exit_dropped_when_history_write_fails() {
        let backend = Arc::new(FlakyBackend::default());
        let store = StateStore::new(backend.clone());
        let mut tracker =
            SessionTracker::restore(store, TrackerOptions::default()).with_regions(regions());
        let start = t0();

        tracker.handle_enter("court_1", start);
        backend.fail_writes.store(true, Ordering::SeqCst);

        assert!(matches!(
            tracker.handle_exit("court_1", start + Duration::minutes(20)),
            Transition::Dropped(_)
        ));
        assert!(tracker.is_active());

        backend.fail_writes.store(false, Ordering::SeqCst);
        assert!(matches!(
            tracker.handle_exit("court_1", start + Duration::minutes(25)),
            Transition::Finalized(_)
        ));
    }

    #[test]
    fn test_open_session_keeps_label_after_region_reload() {
        let (mut tracker, _) = tracker();
        let start = t0();
        tracker.handle_enter("court_1", start);

        tracker.set_regions(Vec::new());
        let Transition::Finalized(session) =
            tracker.handle_exit("court_1", start + Duration::minutes(20))
        else {
            panic!("expected finalized");
        };
        assert_eq!(session.region_label, "Mission Court");
    }
}
