//! Region monitoring.
//!
//! The monitor decides which regions are registered with the location
//! source and forwards boundary crossings for those regions to the router.
//! How the platform observes the regions is outside this crate; callers
//! deliver crossings through [`RegionMonitor::deliver`].

use crate::core::region::{select_for_monitoring, Coordinates, TrackableRegion};
use crate::router::{RouterError, RouterHandle};
use crate::source::types::ProximityEvent;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Radius around each region that counts as "inside".
pub const PROXIMITY_RADIUS_METERS: f64 = 50.0;

/// Radius around the device within which regions are candidates.
pub const REGION_SEARCH_RADIUS_KM: f64 = 10.0;

/// Platform ceiling on concurrently monitored regions.
pub const DEFAULT_MAX_MONITORED_REGIONS: usize = 20;

/// Whether the user allowed location access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationPermission {
    #[default]
    Granted,
    Denied,
}

/// Configuration for region monitoring.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub max_regions: usize,
    pub search_radius_km: f64,
    /// Geofence radius registered around each region
    pub proximity_radius_meters: f64,
    pub permission: LocationPermission,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_regions: DEFAULT_MAX_MONITORED_REGIONS,
            search_radius_km: REGION_SEARCH_RADIUS_KM,
            proximity_radius_meters: PROXIMITY_RADIUS_METERS,
            permission: LocationPermission::Granted,
        }
    }
}

/// A geofence the location source should watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRegistration {
    pub region_id: String,
    pub label: String,
    pub center: Coordinates,
    pub radius_meters: f64,
}

/// Errors that can occur when starting monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    PermissionDenied,
    AlreadyRunning,
    NoRegions,
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::PermissionDenied => write!(f, "Location permission denied"),
            MonitorError::AlreadyRunning => write!(f, "Monitoring is already running"),
            MonitorError::NoRegions => write!(f, "No regions within the search radius"),
        }
    }
}

impl std::error::Error for MonitorError {}

/// Why a delivered event was not forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    NotMonitoring,
    UnmonitoredRegion(String),
    Router(RouterError),
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::NotMonitoring => write!(f, "Monitoring is stopped"),
            DeliveryError::UnmonitoredRegion(id) => write!(f, "Region '{id}' is not monitored"),
            DeliveryError::Router(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Registers regions and forwards their crossings to the tracker.
pub struct RegionMonitor {
    config: MonitorConfig,
    handle: RouterHandle,
    monitored: Mutex<Vec<TrackableRegion>>,
    running: AtomicBool,
    permitted: AtomicBool,
}

impl RegionMonitor {
    pub fn new(config: MonitorConfig, handle: RouterHandle) -> Self {
        let permitted = config.permission == LocationPermission::Granted;
        Self {
            config,
            handle,
            monitored: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            permitted: AtomicBool::new(permitted),
        }
    }

    fn monitored(&self) -> MutexGuard<'_, Vec<TrackableRegion>> {
        self.monitored.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the regions nearest to `position` and start forwarding events.
    ///
    /// `keep` names a region that must stay registered regardless of distance,
    /// normally the region of a session resumed after a restart. The full
    /// region set is also handed to the tracker so manual check-ins can use
    /// any known region.
    ///
    /// Returns the number of registered regions.
    pub fn start(
        &self,
        position: &Coordinates,
        regions: &[TrackableRegion],
        keep: Option<&str>,
    ) -> Result<usize, MonitorError> {
        if self.permission() == LocationPermission::Denied {
            tracing::warn!("Location permission denied, monitoring not started");
            return Err(MonitorError::PermissionDenied);
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(MonitorError::AlreadyRunning);
        }

        let mut selected = select_for_monitoring(
            position,
            regions,
            self.config.search_radius_km,
            self.config.max_regions,
        );

        if let Some(keep_id) = keep {
            if !selected.iter().any(|r| r.id == keep_id) {
                if let Some(region) = regions.iter().find(|r| r.id == keep_id) {
                    if selected.len() >= self.config.max_regions {
                        selected.pop();
                    }
                    selected.push(region.clone());
                }
            }
        }

        if selected.is_empty() {
            return Err(MonitorError::NoRegions);
        }

        if let Err(e) = self.handle.reload_regions(regions.to_vec()) {
            tracing::warn!("Could not hand regions to the tracker: {e}");
        }

        let count = selected.len();
        *self.monitored() = selected;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(count, "Monitoring started");

        Ok(count)
    }

    /// Deregister every region. An open session is left untouched.
    pub fn stop(&self) {
        self.monitored().clear();
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Monitoring stopped");
        }
    }

    pub fn permission(&self) -> LocationPermission {
        if self.permitted.load(Ordering::SeqCst) {
            LocationPermission::Granted
        } else {
            LocationPermission::Denied
        }
    }

    /// Apply a permission change. Revoking access stops monitoring.
    pub fn set_permission(&self, permission: LocationPermission) {
        let granted = permission == LocationPermission::Granted;
        if self.permitted.swap(granted, Ordering::SeqCst) != granted {
            tracing::info!(?permission, "Location permission changed");
        }
        if !granted {
            self.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn monitored_regions(&self) -> Vec<TrackableRegion> {
        self.monitored().clone()
    }

    /// Geofences to register with the location source, one per monitored region.
    pub fn registrations(&self) -> Vec<RegionRegistration> {
        self.monitored()
            .iter()
            .map(|r| RegionRegistration {
                region_id: r.id.clone(),
                label: r.label.clone(),
                center: r.coordinates,
                radius_meters: self.config.proximity_radius_meters,
            })
            .collect()
    }

    pub fn is_monitored(&self, region_id: &str) -> bool {
        self.monitored().iter().any(|r| r.id == region_id)
    }

    /// Forward a crossing reported by the location source.
    pub fn deliver(&self, event: ProximityEvent) -> Result<(), DeliveryError> {
        if !self.is_running() {
            tracing::debug!(region = %event.region_id, "Dropped event, monitoring stopped");
            return Err(DeliveryError::NotMonitoring);
        }
        if !self.is_monitored(&event.region_id) {
            tracing::warn!(region = %event.region_id, "Dropped event for unmonitored region");
            return Err(DeliveryError::UnmonitoredRegion(event.region_id));
        }
        self.handle.send_event(event).map_err(DeliveryError::Router)
    }

    pub fn handle(&self) -> &RouterHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::{SessionTracker, TrackerOptions};
    use crate::core::region::fallback_regions;
    use crate::router::ProximityRouter;
    use crate::store::{MemoryBackend, StateStore};
    use chrono::Utc;
    use std::sync::Arc;

    fn setup(config: MonitorConfig) -> (ProximityRouter, RegionMonitor) {
        let store = StateStore::new(Arc::new(MemoryBackend::new()));
        let tracker = SessionTracker::restore(store, TrackerOptions::default());
        let (router, handle) = ProximityRouter::new(tracker, 64);
        (router, RegionMonitor::new(config, handle))
    }

    fn mission() -> Coordinates {
        Coordinates::new(37.7599, -122.4148)
    }

    #[test]
    fn test_permission_denied() {
        let config = MonitorConfig {
            permission: LocationPermission::Denied,
            ..MonitorConfig::default()
        };
        let (_router, monitor) = setup(config);

        assert_eq!(
            monitor.start(&mission(), &fallback_regions(), None),
            Err(MonitorError::PermissionDenied)
        );
        assert!(monitor.monitored_regions().is_empty());
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_revoking_permission_stops_monitoring() {
        let (_router, monitor) = setup(MonitorConfig::default());
        monitor.start(&mission(), &fallback_regions(), None).unwrap();

        monitor.set_permission(LocationPermission::Denied);
        assert!(!monitor.is_running());
        assert_eq!(
            monitor.deliver(ProximityEvent::enter("court_1", Utc::now())),
            Err(DeliveryError::NotMonitoring)
        );
        assert_eq!(
            monitor.start(&mission(), &fallback_regions(), None),
            Err(MonitorError::PermissionDenied)
        );

        monitor.set_permission(LocationPermission::Granted);
        assert!(monitor.start(&mission(), &fallback_regions(), None).is_ok());
    }

    #[test]
    fn test_registrations_use_proximity_radius() {
        let config = MonitorConfig {
            max_regions: 2,
            proximity_radius_meters: 75.0,
            ..MonitorConfig::default()
        };
        let (_router, monitor) = setup(config);
        assert!(monitor.registrations().is_empty());

        monitor.start(&mission(), &fallback_regions(), None).unwrap();
        let registrations = monitor.registrations();
        assert_eq!(registrations.len(), 2);
        assert_eq!(registrations[0].region_id, "court_1");
        assert!(registrations.iter().all(|r| r.radius_meters == 75.0));

        let court = fallback_regions().into_iter().find(|r| r.id == "court_1").unwrap();
        assert_eq!(registrations[0].center, court.coordinates);

        monitor.stop();
        assert!(monitor.registrations().is_empty());
    }

    #[test]
    fn test_default_radius() {
        assert_eq!(MonitorConfig::default().proximity_radius_meters, 50.0);
        assert_eq!(MonitorConfig::default().permission, LocationPermission::Granted);
    }

    #[test]
    fn test_start_respects_ceiling() {
        let config = MonitorConfig {
            max_regions: 2,
            ..MonitorConfig::default()
        };
        let (_router, monitor) = setup(config);

        assert_eq!(monitor.start(&mission(), &fallback_regions(), None), Ok(2));
        assert_eq!(monitor.monitored_regions()[0].id, "court_1");
        assert_eq!(
            monitor.start(&mission(), &fallback_regions(), None),
            Err(MonitorError::AlreadyRunning)
        );
    }

    #[test]
    fn test_keep_region_survives_truncation() {
        let config = MonitorConfig {
            max_regions: 1,
            ..MonitorConfig::default()
        };
        let (_router, monitor) = setup(config);

        monitor
            .start(&mission(), &fallback_regions(), Some("pool_1"))
            .unwrap();
        assert!(monitor.is_monitored("pool_1"));
        assert!(!monitor.is_monitored("court_1"));
    }

    #[test]
    fn test_no_regions_in_radius() {
        let (_router, monitor) = setup(MonitorConfig::default());
        let far_away = Coordinates::new(-33.86, 151.21);
        assert_eq!(
            monitor.start(&far_away, &fallback_regions(), None),
            Err(MonitorError::NoRegions)
        );
    }

    #[test]
    fn test_deliver_forwards_to_tracker() {
        let (mut router, monitor) = setup(MonitorConfig::default());
        monitor.start(&mission(), &fallback_regions(), None).unwrap();

        monitor
            .deliver(ProximityEvent::enter("court_1", Utc::now()))
            .unwrap();
        router.drain();

        assert!(router.tracker().is_active());
        assert!(router.tracker().region("gym_1").is_some());
    }

    #[test]
    fn test_stop_keeps_open_session_and_drops_events() {
        let (mut router, monitor) = setup(MonitorConfig::default());
        monitor.start(&mission(), &fallback_regions(), None).unwrap();
        monitor
            .deliver(ProximityEvent::enter("court_1", Utc::now()))
            .unwrap();
        router.drain();

        monitor.stop();
        assert!(monitor.monitored_regions().is_empty());
        assert_eq!(
            monitor.deliver(ProximityEvent::exit("court_1", Utc::now())),
            Err(DeliveryError::NotMonitoring)
        );
        router.drain();
        assert!(router.tracker().is_active());
    }

    #[test]
    fn test_unmonitored_region_dropped() {
        let config = MonitorConfig {
            max_regions: 1,
            ..MonitorConfig::default()
        };
        let (_router, monitor) = setup(config);
        monitor.start(&mission(), &fallback_regions(), None).unwrap();

        assert_eq!(
            monitor.deliver(ProximityEvent::enter("pool_1", Utc::now())),
            Err(DeliveryError::UnmonitoredRegion("pool_1".to_string()))
        );
    }
}
