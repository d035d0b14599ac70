//! Configuration for the geofence session agent.

use crate::core::metric::DEFAULT_BODY_MASS_KG;
use crate::core::region::Coordinates;
use crate::gateway::DEFAULT_SYNC_TIMEOUT;
use crate::source::{LocationPermission, DEFAULT_MAX_MONITORED_REGIONS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path for the durable session state and transparency log
    pub data_path: PathBuf,

    /// JSON region directory file; built-in regions are used when absent
    pub regions_path: Option<PathBuf>,

    /// Last known device position
    pub position: Option<Coordinates>,

    /// Body mass for energy estimates; the default mass is used when absent
    pub body_mass_kg: Option<f64>,

    /// Platform ceiling on concurrently monitored regions
    pub max_monitored_regions: usize,

    /// Upper bound for one health sync request
    #[serde(with = "duration_serde")]
    pub sync_timeout: Duration,

    /// IANA timezone used when displaying sessions
    pub timezone: String,

    /// Whether monitoring is currently paused
    pub paused: bool,

    /// Location access granted by the user; monitoring refuses to start when denied
    pub location_permission: LocationPermission,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geofence-session-agent");

        Self {
            data_path: data_dir,
            regions_path: None,
            position: None,
            body_mass_kg: None,
            max_monitored_regions: DEFAULT_MAX_MONITORED_REGIONS,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            timezone: "UTC".to_string(),
            paused: false,
            location_permission: LocationPermission::Granted,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geofence-session-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(self.state_path())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Directory holding the key-value state files.
    pub fn state_path(&self) -> PathBuf {
        self.data_path.join("state")
    }

    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    pub fn body_mass_kg(&self) -> f64 {
        self.body_mass_kg
            .filter(|m| m.is_finite() && *m > 0.0)
            .unwrap_or(DEFAULT_BODY_MASS_KG)
    }

    /// Parsed display timezone, UTC when the name is not recognized.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::Tz::UTC)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
