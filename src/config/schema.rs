//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.
//! Durations are integer milliseconds; zero means "use the default" and is
//! resolved by [`validate_config`](crate::config::validation::validate_config).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u32 = 8080;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_READ_HEADER_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1 << 20;
/// hyper refuses read buffers smaller than this.
pub const MIN_MAX_HEADER_BYTES: usize = 8192;
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Backend HTTP engine selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineType {
    /// axum router on top of hyper.
    Axum,
    /// hyper `service_fn` with the built-in segment matcher.
    Hyper,
}

impl EngineType {
    pub const ALL: [EngineType; 2] = [EngineType::Axum, EngineType::Hyper];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::Axum => "axum",
            EngineType::Hyper => "hyper",
        }
    }
}

impl Default for EngineType {
    fn default() -> Self {
        EngineType::Axum
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine name that is not one of [`EngineType::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown engine type: {0}")]
pub struct UnknownEngineType(pub String);

impl FromStr for EngineType {
    type Err = UnknownEngineType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "axum" => Ok(EngineType::Axum),
            "hyper" => Ok(EngineType::Hyper),
            _ => Err(UnknownEngineType(s.to_string())),
        }
    }
}

impl TryFrom<String> for EngineType {
    type Error = UnknownEngineType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EngineType> for String {
    fn from(value: EngineType) -> Self {
        value.as_str().to_string()
    }
}

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Router and listener settings.
    pub router: RouterConfig,

    /// Response compression.
    pub compression: CompressionConfig,

    /// Shutdown deadlines.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Router configuration shared by every engine.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Which backend engine serves requests.
    #[serde(rename = "type")]
    pub engine: EngineType,

    /// Listen port, 1..=65535.
    pub port: u32,

    /// Bind host for the listener.
    pub host: String,

    /// Time allowed to read the request body.
    pub read_timeout_ms: u64,

    /// Time allowed for the handler chain to produce a response.
    pub write_timeout_ms: u64,

    /// Keep-alive connections idle longer than this are closed.
    pub idle_timeout_ms: u64,

    /// Time allowed for the client to send request headers.
    pub read_header_timeout_ms: u64,

    /// Upper bound on the header read buffer.
    pub max_header_bytes: usize,

    /// Maximum concurrent connections; further connections are rejected.
    pub max_connections: usize,

    /// Path answered by the readiness middleware.
    pub health_path: String,

    /// axum engine settings.
    pub axum: AxumConfig,

    /// hyper engine settings.
    pub hyper: HyperConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            engine: EngineType::default(),
            port: DEFAULT_PORT,
            host: "0.0.0.0".to_string(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            read_header_timeout_ms: DEFAULT_READ_HEADER_TIMEOUT_MS,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            axum: AxumConfig::default(),
            hyper: HyperConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Default configuration for a given engine.
    pub fn for_engine(engine: EngineType) -> Self {
        Self {
            engine,
            ..Self::default()
        }
    }

    /// `host:port` listen address.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn read_header_timeout(&self) -> Duration {
        Duration::from_millis(self.read_header_timeout_ms)
    }
}

/// axum engine settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AxumConfig {
    /// Maximum buffered request body in bytes.
    pub body_limit: usize,
}

impl Default for AxumConfig {
    fn default() -> Self {
        Self {
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

/// hyper engine settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HyperConfig {
    /// Allow HTTP/1.1 keep-alive.
    pub keep_alive: bool,

    /// Maximum buffered request body in bytes.
    pub body_limit: usize,

    /// Support half-closed client connections.
    pub half_close: bool,
}

impl Default for HyperConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            body_limit: DEFAULT_BODY_LIMIT,
            half_close: false,
        }
    }
}

/// Compression middleware configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,

    /// gzip level 0-9; anything else falls back to the default level.
    pub level: i32,

    /// Bodies shorter than this are sent as-is.
    pub min_length: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
            min_length: 0,
        }
    }
}

/// Graceful shutdown deadlines.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Delay between flipping readiness and closing the listener.
    pub readiness_grace_ms: u64,

    /// Deadline for draining in-flight requests.
    pub router_timeout_ms: u64,

    /// Deadline for dependent resource pools to go idle.
    pub pool_timeout_ms: u64,

    /// Pool in-use counter polling interval.
    pub pool_poll_interval_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            readiness_grace_ms: 0,
            router_timeout_ms: 15_000,
            pool_timeout_ms: 5_000,
            pool_poll_interval_ms: 100,
        }
    }
}

impl ShutdownConfig {
    pub fn readiness_grace(&self) -> Duration {
        Duration::from_millis(self.readiness_grace_ms)
    }

    pub fn router_timeout(&self) -> Duration {
        Duration::from_millis(self.router_timeout_ms)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }

    pub fn pool_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pool_poll_interval_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
