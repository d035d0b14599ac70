//! Demonstration of the geofence session tracker.
//!
//! This example shows how to:
//! 1. Load regions and pick the ones to monitor
//! 2. Feed enter/exit events through the router
//! 3. Watch sessions get recorded or discarded
//! 4. Compute weekly statistics from the history
//!
//! Run with: cargo run --example replay_demo

use std::sync::Arc;

use chrono::{Duration, Utc};
use geofence_session_agent::{
    core::{fallback_regions, weekly_stats, Coordinates, SessionTracker, TrackerOptions, Transition},
    router::ProximityRouter,
    source::{MonitorConfig, ProximityEvent, RegionMonitor},
    store::{MemoryBackend, StateStore},
    transparency::create_shared_log,
    LOCATION_DECLARATION,
};

fn main() {
    println!("Geofence Session Agent - Replay Demo");
    println!("====================================");
    println!();
    println!("{LOCATION_DECLARATION}");
    println!();

    let store = StateStore::new(Arc::new(MemoryBackend::new()));
    let log = create_shared_log();
    let tracker = SessionTracker::restore(store.clone(), TrackerOptions::default())
        .with_transparency_log(log.clone());

    let (router, handle) = ProximityRouter::new(tracker, 64);
    let mut router = router.with_observer(|t| match t {
        Transition::Opened(s) => println!("  opened   {} ({})", s.region_label, s.activity_type),
        Transition::Finalized(s) => println!(
            "  recorded {} - {} min, {} kcal",
            s.region_label,
            s.duration().num_minutes(),
            s.estimated_energy.unwrap_or(0)
        ),
        Transition::Discarded { session, duration } => println!(
            "  skipped  {} - only {} min",
            session.region_label,
            duration.num_minutes()
        ),
        other => println!("  no change: {other:?}"),
    });

    let monitor = RegionMonitor::new(MonitorConfig::default(), handle);
    let position = Coordinates::new(37.7599, -122.4148);
    match monitor.start(&position, &fallback_regions(), None) {
        Ok(count) => println!("Monitoring {count} regions near the Mission"),
        Err(e) => {
            println!("Could not start monitoring: {e}");
            return;
        }
    }
    println!();

    let base = Utc::now() - Duration::days(3);
    let script = [
        ProximityEvent::enter("court_1", base),
        ProximityEvent::exit("court_1", base + Duration::minutes(20)),
        ProximityEvent::enter("court_2", base + Duration::hours(4)),
        ProximityEvent::exit("court_2", base + Duration::hours(4) + Duration::minutes(5)),
        ProximityEvent::enter("studio_1", base + Duration::days(1)),
        ProximityEvent::enter("court_1", base + Duration::days(1) + Duration::minutes(10)),
        ProximityEvent::exit("studio_1", base + Duration::days(1) + Duration::minutes(75)),
    ];

    println!("Replaying {} events...", script.len());
    for event in script {
        if let Err(e) = monitor.deliver(event) {
            println!("  not delivered: {e}");
        }
    }
    router.drain();
    println!();

    let history = store.history().unwrap_or_default();
    let stats = weekly_stats(&history, Utc::now());
    println!("Last 7 days:");
    println!("  Sessions: {}", stats.session_count);
    println!("  Minutes: {}", stats.total_minutes);
    println!("  Energy: {} kcal", stats.total_energy);
    println!(
        "  Favorite: {}",
        stats.favorite_region.as_deref().unwrap_or("-")
    );
    println!();

    monitor.stop();
    println!("{}", log.summary());
}
