//! Gateway configuration with validation.
//!
//! Every section is `#[serde(default)]`, so a TOML file only needs the keys it
//! overrides. Durations are written as `"10s"`, `"500ms"` or `"1m"`.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener
    pub server: ServerConfig,
    /// WebSocket sessions
    pub websocket: WebSocketConfig,
    /// Server-Sent-Events sessions
    pub sse: SseConfig,
    /// Per-connection send-rate cap
    pub rate_limit: RateLimitConfig,
    /// Bus sizing
    pub bus: BusConfig,
    /// Server-side type restrictions
    pub streams: StreamsConfig,
    /// Token authentication
    pub auth: AuthConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

impl GatewayConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.events_per_window == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "events_per_window cannot be 0".into(),
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidRateLimit("window cannot be 0".into()));
        }

        if self.sse.output_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "sse.output_capacity cannot be 0".into(),
            ));
        }
        if self.bus.subscriber_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "bus.subscriber_capacity cannot be 0".into(),
            ));
        }
        if self.websocket.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "websocket.max_message_size cannot be 0".into(),
            ));
        }

        if self.websocket.write_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "websocket.write_timeout cannot be 0".into(),
            ));
        }
        if self.websocket.ping_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "websocket.ping_interval cannot be 0".into(),
            ));
        }
        if self.sse.keep_alive.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sse.keep_alive cannot be 0".into(),
            ));
        }

        if let Some(token) = &self.auth.token {
            if token.is_empty() {
                return Err(ConfigError::Invalid("auth.token cannot be empty".into()));
            }
        }

        Ok(())
    }

    /// Listener bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 7070)
    pub port: u16,
    /// How long shutdown waits for live sessions to unwind
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 7070,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// WebSocket session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Origins allowed to upgrade ("*" for all). Requests without an
    /// `Origin` header (non-browser clients) are always accepted.
    pub allowed_origins: Vec<String>,
    /// Deadline for a single frame write
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    /// Keep-alive ping interval
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
    /// Max inbound control message size in bytes
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            max_message_size: 64 * 1024,
        }
    }
}

/// SSE session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SseConfig {
    /// Capacity of the merged output queue
    pub output_capacity: usize,
    /// `retry:` hint sent with error frames
    #[serde(with = "humantime_serde")]
    pub retry: Duration,
    /// Comment keep-alive interval
    #[serde(with = "humantime_serde")]
    pub keep_alive: Duration,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            output_capacity: 64,
            retry: Duration::from_secs(3),
            keep_alive: Duration::from_secs(15),
        }
    }
}

/// Fixed-window rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Events written per connection per window
    pub events_per_window: u32,
    /// Window length
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            events_per_window: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Bus sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Queue capacity of each subscription
    pub subscriber_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Server-side type restrictions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    /// Event types never streamed to clients, whatever they ask for
    pub disabled_types: Vec<String>,
}

/// Token authentication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Required bearer token (None = no auth required)
    pub token: Option<String>,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config: {0}")]
    Io(String),
    /// Config file is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(String),
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m", which are its suffixes
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
