//! Trackable regions and radius-based candidate selection.
//!
//! Regions come from an external directory. When the directory cannot be
//! reached a small built-in sample set is used instead, so monitoring never
//! starts with zero regions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in kilometers.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lng = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }
}

/// A physical location whose proximity events start and end sessions.
///
/// Immutable for the duration of a monitoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackableRegion {
    /// Unique region identifier (e.g. `court_1`)
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Activity tag used for energy estimation (e.g. `basketball`)
    pub activity_type: String,
    /// Region center
    pub coordinates: Coordinates,
}

impl TrackableRegion {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        activity_type: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            activity_type: activity_type.into(),
            coordinates: Coordinates::new(latitude, longitude),
        }
    }
}

/// A region record as returned by the external directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRegion {
    pub id: String,
    pub name: String,
    pub activity_type: String,
    pub lat: f64,
    pub lng: f64,
}

impl From<DirectoryRegion> for TrackableRegion {
    fn from(r: DirectoryRegion) -> Self {
        TrackableRegion::new(r.id, r.name, r.activity_type, r.lat, r.lng)
    }
}

/// Errors raised by a region directory.
#[derive(Debug)]
pub enum DirectoryError {
    Unavailable(String),
    Parse(String),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::Unavailable(e) => write!(f, "Region directory unavailable: {e}"),
            DirectoryError::Parse(e) => write!(f, "Region directory parse error: {e}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Source of venue/trainer locations.
pub trait RegionDirectory {
    fn fetch_regions(&self) -> Result<Vec<DirectoryRegion>, DirectoryError>;
}

/// Region directory backed by a JSON array on disk.
pub struct JsonFileDirectory {
    path: PathBuf,
}

impl JsonFileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RegionDirectory for JsonFileDirectory {
    fn fetch_regions(&self) -> Result<Vec<DirectoryRegion>, DirectoryError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| DirectoryError::Unavailable(format!("{:?}: {e}", self.path)))?;
        serde_json::from_str(&content).map_err(|e| DirectoryError::Parse(e.to_string()))
    }
}

/// A directory that is never reachable. Used when no directory is configured.
pub struct OfflineDirectory;

impl RegionDirectory for OfflineDirectory {
    fn fetch_regions(&self) -> Result<Vec<DirectoryRegion>, DirectoryError> {
        Err(DirectoryError::Unavailable("no region directory configured".to_string()))
    }
}

/// Built-in regions used when the directory is unreachable or empty.
pub fn fallback_regions() -> Vec<TrackableRegion> {
    vec![
        TrackableRegion::new("court_1", "Mission Street Court", "basketball", 37.7599, -122.4148),
        TrackableRegion::new("court_2", "Dolores Park Tennis", "tennis", 37.7596, -122.4269),
        TrackableRegion::new("gym_1", "SoMa Strength Club", "gym", 37.7786, -122.4059),
        TrackableRegion::new("pool_1", "Hamilton Pool", "swimming", 37.7845, -122.4362),
        TrackableRegion::new("studio_1", "Valencia Yoga Loft", "yoga", 37.7640, -122.4216),
    ]
}

/// Load the current region set, falling back to the built-in sample set.
pub fn load_regions(directory: &dyn RegionDirectory) -> Vec<TrackableRegion> {
    match directory.fetch_regions() {
        Ok(regions) if !regions.is_empty() => {
            tracing::debug!(count = regions.len(), "Loaded regions from directory");
            regions.into_iter().map(TrackableRegion::from).collect()
        }
        Ok(_) => {
            tracing::info!("Region directory returned no regions, using built-in set");
            fallback_regions()
        }
        Err(e) => {
            tracing::info!("{e}; using built-in regions");
            fallback_regions()
        }
    }
}

/// Keep only regions within `max_distance_km` of `position`, nearest first.
///
/// Ties on distance are broken by region id so the order is deterministic.
pub fn filter_by_radius(
    position: &Coordinates,
    regions: &[TrackableRegion],
    max_distance_km: f64,
) -> Vec<TrackableRegion> {
    let mut candidates: Vec<(f64, &TrackableRegion)> = regions
        .iter()
        .map(|r| (position.distance_km(&r.coordinates), r))
        .filter(|(d, _)| *d <= max_distance_km)
        .collect();

    candidates.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.id.cmp(&b.1.id))
    });

    candidates.into_iter().map(|(_, r)| r.clone()).collect()
}

/// Select the regions to register with the platform monitor.
///
/// Applies the radius filter, then truncates to the platform ceiling keeping
/// the closest regions.
pub fn select_for_monitoring(
    position: &Coordinates,
    regions: &[TrackableRegion],
    max_distance_km: f64,
    max_regions: usize,
) -> Vec<TrackableRegion> {
    let mut selected = filter_by_radius(position, regions, max_distance_km);
    selected.truncate(max_regions);
    selected
}
