//! Health record sync for finalized sessions.
//!
//! The tracker pushes each finalized session through a [`HealthSink`]. A push
//! is best-effort: failures leave the session `pending` in local history.
//! The HTTP client implementation is available with the `gateway` feature.

use crate::core::session::Session;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound for a single sync request.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// One-way push of a finalized session to the external health record.
///
/// Implementations must return within a bounded time.
pub trait HealthSink: Send + Sync {
    fn submit_session(&self, session: &Session) -> Result<(), GatewayError>;
}

impl<T: HealthSink + ?Sized> HealthSink for Arc<T> {
    fn submit_session(&self, session: &Session) -> Result<(), GatewayError> {
        (**self).submit_session(session)
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    pub host: String,
    /// Gateway port
    pub port: u16,
    /// Bearer authentication token
    pub token: String,
    /// Request timeout
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create a new gateway configuration.
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            token: token.into(),
            timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from the runtime directory.
    ///
    /// Reads `runtime/gateway.port` and `runtime/gateway.token` under the
    /// agent's data directory.
    pub fn from_runtime_dir() -> Result<Self, GatewayError> {
        let runtime_dir = Self::default_runtime_dir()?;

        let port_path = runtime_dir.join("gateway.port");
        let token_path = runtime_dir.join("gateway.token");

        let port_str = std::fs::read_to_string(&port_path).map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read gateway port from {port_path:?}: {e}"
            ))
        })?;

        let port: u16 = port_str.trim().parse().map_err(|e| {
            GatewayError::Config(format!("Invalid port number '{}': {}", port_str.trim(), e))
        })?;

        let token = std::fs::read_to_string(&token_path)
            .map_err(|e| {
                GatewayError::Config(format!(
                    "Failed to read gateway token from {token_path:?}: {e}"
                ))
            })?
            .trim()
            .to_string();

        Ok(Self::new("127.0.0.1", port, token))
    }

    fn default_runtime_dir() -> Result<PathBuf, GatewayError> {
        dirs::data_local_dir()
            .map(|d| d.join("geofence-session-agent").join("runtime"))
            .ok_or_else(|| {
                GatewayError::Config("Could not determine runtime directory".to_string())
            })
    }

    /// Get the full gateway URL.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get the session submission endpoint URL.
    pub fn sessions_url(&self) -> String {
        format!("{}/v1/sessions", self.url())
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.url())
    }
}

/// Gateway client error types.
#[derive(Debug)]
pub enum GatewayError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error, including timeouts
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Config(msg) => write!(f, "Gateway config error: {msg}"),
            GatewayError::Network(msg) => write!(f, "Gateway network error: {msg}"),
            GatewayError::Server { status, message } => {
                write!(f, "Gateway server error ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for GatewayError {}

/// Session payload accepted by the health record gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSubmission {
    pub session_id: String,
    pub device_id: String,
    pub timezone: String,
    pub activity_type: String,
    pub duration_minutes: f64,
    pub energy_units: u32,
    /// RFC3339
    pub start_time: String,
    /// RFC3339
    pub end_time: String,
    pub meta: SubmissionMeta,
}

/// Submission metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionMeta {
    pub source: String,
    pub version: String,
}

impl SessionSubmission {
    /// Build the payload for a finalized session.
    pub fn from_session(session: &Session, device_id: &str, timezone: chrono_tz::Tz) -> Self {
        Self {
            session_id: session.id.to_string(),
            device_id: device_id.to_string(),
            timezone: timezone.to_string(),
            activity_type: session.activity_type.clone(),
            duration_minutes: session.duration_minutes(),
            energy_units: session.estimated_energy.unwrap_or(0),
            start_time: session.start.to_rfc3339(),
            end_time: session.end.unwrap_or(session.start).to_rfc3339(),
            meta: SubmissionMeta {
                source: "geofence-session-agent".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// Generate a device ID from hostname + a random suffix.
pub fn generate_device_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!(
        "tracker-{}-{}",
        hostname,
        &uuid::Uuid::new_v4().to_string()[..8]
    )
}

/// Gateway client for submitting sessions.
#[cfg(feature = "gateway")]
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
    device_id: String,
    timezone: chrono_tz::Tz,
}

#[cfg(feature = "gateway")]
impl GatewayClient {
    /// Create a new gateway client.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            device_id: generate_device_id(),
            timezone: chrono_tz::Tz::UTC,
        })
    }

    pub fn with_timezone(mut self, timezone: chrono_tz::Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Test connection to the gateway.
    pub async fn test_connection(&self) -> Result<bool, GatewayError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Submit one finalized session.
    pub async fn submit(&self, session: &Session) -> Result<(), GatewayError> {
        if session.is_open() {
            return Err(GatewayError::Config(
                "Cannot submit a session that is still open".to_string(),
            ));
        }

        let payload = SessionSubmission::from_session(session, &self.device_id, self.timezone);

        let response = self
            .client
            .post(self.config.sessions_url())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }

    /// Get the device ID.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Blocking gateway client for the tracker's synchronous event loop.
#[cfg(feature = "gateway")]
pub struct BlockingGatewayClient {
    inner: GatewayClient,
    runtime: tokio::runtime::Runtime,
    timeout: Duration,
}

#[cfg(feature = "gateway")]
impl BlockingGatewayClient {
    /// Create a new blocking gateway client.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create runtime: {e}")))?;

        let timeout = config.timeout;
        Ok(Self {
            inner: GatewayClient::new(config)?,
            runtime,
            timeout,
        })
    }

    pub fn with_timezone(mut self, timezone: chrono_tz::Tz) -> Self {
        self.inner = self.inner.with_timezone(timezone);
        self
    }

    /// Test connection to the gateway.
    pub fn test_connection(&self) -> Result<bool, GatewayError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    /// Get the device ID.
    pub fn device_id(&self) -> &str {
        self.inner.device_id()
    }
}

#[cfg(feature = "gateway")]
impl HealthSink for BlockingGatewayClient {
    fn submit_session(&self, session: &Session) -> Result<(), GatewayError> {
        self.runtime.block_on(async {
            tokio::time::timeout(self.timeout, self.inner.submit(session))
                .await
                .map_err(|_| GatewayError::Network("request timed out".to_string()))?
        })
    }
}
