//! End-to-end tests for the session tracker over a file-backed store

use chrono::{DateTime, Duration, TimeZone, Utc};
use geofence_session_agent::core::{
    fallback_regions, weekly_stats, Session, SessionTracker, SyncStatus, TrackerOptions,
    Transition,
};
use geofence_session_agent::gateway::{GatewayError, HealthSink};
use geofence_session_agent::router::ProximityRouter;
use geofence_session_agent::source::ProximityEvent;
use geofence_session_agent::store::{FileBackend, LockError, StateStore, HISTORY_CAP};
use geofence_session_agent::transparency::create_shared_log_with_persistence;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 18, 0, 0).unwrap()
}

fn file_store(dir: &Path) -> StateStore {
    StateStore::new(Arc::new(FileBackend::new(dir)))
}

fn tracker(store: StateStore) -> SessionTracker {
    SessionTracker::restore(store, TrackerOptions::default()).with_regions(fallback_regions())
}

/// Health sink that counts submissions and can be switched offline.
#[derive(Default)]
struct CountingSink {
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl HealthSink for CountingSink {
    fn submit_session(&self, _session: &Session) -> Result<(), GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            Err(GatewayError::Network("offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_basketball_session_recorded_and_synced() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path());
    let sink = Arc::new(CountingSink::default());
    let mut tracker = tracker(store.clone()).with_sink(Box::new(sink.clone()));

    assert!(matches!(
        tracker.handle_enter("court_1", t0()),
        Transition::Opened(_)
    ));
    let Transition::Finalized(session) = tracker.handle_exit("court_1", t0() + Duration::minutes(20))
    else {
        panic!("expected a recorded session");
    };

    assert_eq!(session.estimated_energy, Some(187));
    assert_eq!(session.sync_status, SyncStatus::Synced);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

    let history = store.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, session.id);
    assert_eq!(history[0].sync_status, SyncStatus::Synced);
    assert!(store.load_active().unwrap().is_none());
}

#[test]
fn test_short_visit_never_reaches_sink() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path());
    let sink = Arc::new(CountingSink::default());
    let mut tracker = tracker(store.clone()).with_sink(Box::new(sink.clone()));

    tracker.handle_enter("court_2", t0());
    let transition = tracker.handle_exit("court_2", t0() + Duration::minutes(5));

    assert!(matches!(transition, Transition::Discarded { .. }));
    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    assert!(store.history().unwrap().is_empty());
    assert!(store.load_active().unwrap().is_none());
}

#[test]
fn test_open_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let opened = {
        let mut first = tracker(file_store(dir.path()));
        match first.handle_enter("pool_1", t0()) {
            Transition::Opened(session) => session,
            other => panic!("unexpected transition: {other:?}"),
        }
    };

    let mut second = tracker(file_store(dir.path()));
    let resumed = second.active_session().cloned().unwrap();
    assert_eq!(resumed.id, opened.id);
    assert_eq!(resumed.start, t0());

    let Transition::Finalized(session) = second.handle_exit("pool_1", t0() + Duration::minutes(45))
    else {
        panic!("expected a recorded session");
    };
    assert_eq!(session.id, opened.id);
    assert_eq!(session.duration(), Duration::minutes(45));
}

#[test]
fn test_restart_with_stale_slot_starts_idle() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path());

    let mut tracker_a = tracker(store.clone());
    let Transition::Opened(open) = tracker_a.handle_enter("gym_1", t0()) else {
        panic!("expected an opened session");
    };
    tracker_a.handle_exit("gym_1", t0() + Duration::minutes(30));

    // Crash between history append and slot clear
    store.save_active(&open).unwrap();

    let tracker_b = tracker(file_store(dir.path()));
    assert!(!tracker_b.is_active());
    assert!(store.load_active().unwrap().is_none());
    assert_eq!(store.history().unwrap().len(), 1);
}

#[test]
fn test_failed_sync_retried_later() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path());
    let sink = Arc::new(CountingSink::default());
    sink.offline.store(true, Ordering::SeqCst);
    let mut tracker = tracker(store.clone()).with_sink(Box::new(sink.clone()));

    tracker.handle_enter("studio_1", t0());
    let Transition::Finalized(session) = tracker.handle_exit("studio_1", t0() + Duration::hours(1))
    else {
        panic!("expected a recorded session");
    };
    assert_eq!(session.sync_status, SyncStatus::Pending);
    assert_eq!(store.pending_sync().unwrap().len(), 1);

    sink.offline.store(false, Ordering::SeqCst);
    let report = tracker.sync_pending().unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.synced, 1);
    assert!(store.pending_sync().unwrap().is_empty());
    assert_eq!(store.history().unwrap()[0].sync_status, SyncStatus::Synced);
}

#[test]
fn test_history_evicts_oldest_beyond_cap() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path());
    let mut tracker = tracker(store.clone());

    let mut first_id = None;
    for i in 0..=HISTORY_CAP as i64 {
        let start = t0() + Duration::hours(i);
        tracker.handle_enter("court_1", start);
        if let Transition::Finalized(session) =
            tracker.handle_exit("court_1", start + Duration::minutes(20))
        {
            first_id.get_or_insert(session.id);
        }
    }

    let history = store.history().unwrap();
    assert_eq!(history.len(), HISTORY_CAP);
    assert_eq!(history[0].start, t0() + Duration::hours(HISTORY_CAP as i64));
    assert!(history.iter().all(|s| Some(s.id) != first_id));
}

#[test]
fn test_router_replay_and_weekly_stats() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(dir.path());
    let (mut router, handle) = ProximityRouter::new(tracker(store.clone()), 32);

    let events = [
        ProximityEvent::enter("court_1", t0()),
        ProximityEvent::exit("court_1", t0() + Duration::minutes(30)),
        ProximityEvent::enter("gym_1", t0() + Duration::hours(2)),
        ProximityEvent::enter("court_1", t0() + Duration::hours(2) + Duration::minutes(5)),
        ProximityEvent::exit("gym_1", t0() + Duration::hours(3)),
        ProximityEvent::enter("court_1", t0() + Duration::days(1)),
        ProximityEvent::exit("court_1", t0() + Duration::days(1) + Duration::minutes(10)),
        ProximityEvent::enter("court_1", t0() + Duration::days(2)),
        ProximityEvent::exit("court_1", t0() + Duration::days(2) + Duration::minutes(50)),
    ];
    for event in events {
        handle.send_event(event).unwrap();
    }
    assert_eq!(router.drain(), 9);

    let history = store.history().unwrap();
    assert_eq!(history.len(), 3);

    let stats = weekly_stats(&history, t0() + Duration::days(3));
    assert_eq!(stats.session_count, 3);
    assert_eq!(stats.total_minutes, 30 + 60 + 50);
    assert_eq!(stats.favorite_region.as_deref(), Some("Mission Street Court"));
    assert!((stats.average_minutes - 140.0 / 3.0).abs() < 1e-9);

    let later = weekly_stats(&history, t0() + Duration::days(9));
    assert_eq!(later.session_count, 1);
    assert_eq!(later.total_minutes, 50);
}

#[test]
fn test_second_writer_refused_while_agent_runs() {
    let dir = tempfile::tempdir().unwrap();
    let (agent_store, agent_lock) = StateStore::open_exclusive(dir.path()).unwrap();
    let (mut router, handle) = ProximityRouter::new(tracker(agent_store.clone()), 8);

    handle
        .send_event(ProximityEvent::enter("court_1", t0()))
        .unwrap();
    router.drain();
    let open = agent_store.load_active().unwrap().unwrap();

    // A one-shot command over the same directory must not build its own tracker
    assert!(matches!(
        StateStore::open_exclusive(dir.path()),
        Err(LockError::Held { .. })
    ));

    handle
        .send_event(ProximityEvent::exit("court_1", t0() + Duration::minutes(30)))
        .unwrap();
    router.drain();

    let history = agent_store.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, open.id);
    assert!(agent_store.load_active().unwrap().is_none());

    drop(router);
    drop(agent_lock);

    let (store, _lock) = StateStore::open_exclusive(dir.path()).unwrap();
    let mut one_shot = tracker(store.clone());
    let manual = one_shot
        .start_manual_session("gym_1", t0() + Duration::hours(2))
        .unwrap();
    assert_eq!(store.load_active().unwrap().unwrap().id, manual.id);
}

#[test]
fn test_one_shot_tracker_keeps_transparency_counters() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("transparency.json");

    let one_shot = |action: &dyn Fn(&mut SessionTracker)| {
        let (store, _lock) = StateStore::open_exclusive(&dir.path().join("state")).unwrap();
        let mut tracker = tracker(store)
            .with_transparency_log(create_shared_log_with_persistence(log_path.clone()));
        action(&mut tracker);
        tracker.finish().unwrap();
    };

    one_shot(&|t| {
        t.start_manual_session("court_1", t0()).unwrap();
    });
    one_shot(&|t| {
        t.end_manual_session(t0() + Duration::minutes(40)).unwrap();
    });

    // The next agent start loads what the one-shot commands recorded
    let agent_log = create_shared_log_with_persistence(log_path.clone());
    let stats = agent_log.stats();
    assert_eq!(stats.sessions_opened, 1);
    assert_eq!(stats.sessions_finalized, 1);
}
