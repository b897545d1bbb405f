//! Configuration and limits for the terminal bridge.
//!
//! Field names serialize as camelCase so a partial JSON file such as
//! `{"idleThreshold": 5, "maxMissedPings": 2}` loads with every other value
//! taken from [`Config::default`]. Durations are expressed in seconds
//! (or milliseconds where the name says so).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "WSTERM_";

/// Size limits applied to inbound data.
///
/// These bound memory use per connection before anything is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Limits {
    /// Maximum payload size of a single frame in bytes.
    ///
    /// Default: 16 KB
    pub max_frame_size: usize,

    /// Maximum size of the HTTP upgrade request in bytes.
    ///
    /// Default: 8 KB
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(max_frame_size: usize, max_handshake_size: usize) -> Self {
        Self {
            max_frame_size,
            max_handshake_size,
        }
    }

    /// Limits for small embedded targets.
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 1024,
            max_handshake_size: 2048,
        }
    }

    /// Validate that a frame payload is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake data is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Keep-alive probing parameters.
///
/// A peer that never answers is pinged once it has been silent for
/// `idle_threshold` and evicted on the first prober tick at or after
/// [`KeepAlive::eviction_deadline`], whatever the phase of the prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeepAlive {
    /// Seconds of silence before the first ping.
    ///
    /// Default: 10
    pub idle_threshold: u64,

    /// Prober tick period in seconds.
    ///
    /// Default: 5
    pub probe_interval: u64,

    /// Consecutive unanswered pings before eviction.
    ///
    /// Default: 3
    pub max_missed_pings: u32,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            idle_threshold: 10,
            probe_interval: 5,
            max_missed_pings: 3,
        }
    }
}

impl KeepAlive {
    /// Create keep-alive settings with custom values.
    #[must_use]
    pub const fn new(idle_threshold: u64, probe_interval: u64, max_missed_pings: u32) -> Self {
        Self {
            idle_threshold,
            probe_interval,
            max_missed_pings,
        }
    }

    /// Idle threshold as a [`Duration`].
    #[must_use]
    pub const fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold)
    }

    /// Probe interval as a [`Duration`].
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval)
    }

    /// Silence after which a peer with a ping outstanding is evicted:
    /// `idle_threshold + (max_missed_pings - 1) * probe_interval`.
    #[must_use]
    pub const fn eviction_deadline(&self) -> Duration {
        let extra = self.max_missed_pings.saturating_sub(1) as u64;
        Duration::from_secs(
            self.idle_threshold
                .saturating_add(extra.saturating_mul(self.probe_interval)),
        )
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Address the server listens on.
    ///
    /// Default: 0.0.0.0:8080
    pub bind_addr: SocketAddr,

    /// Request path that upgrades to the terminal WebSocket.
    ///
    /// Default: "/ws"
    pub ws_path: String,

    /// Resource limits.
    #[serde(flatten)]
    pub limits: Limits,

    /// Keep-alive probing.
    #[serde(flatten)]
    pub keep_alive: KeepAlive,

    /// Ring relay capacity per connection, in bytes.
    ///
    /// Default: 1024
    pub ring_buffer_capacity: usize,

    /// Maximum number of simultaneously registered connections.
    ///
    /// Default: 4
    pub max_connections: usize,

    /// Outbound jobs that may wait per connection before enqueue fails.
    ///
    /// Default: 32
    pub send_queue_capacity: usize,

    /// Shell poll loop cadence in milliseconds.
    ///
    /// Default: 10
    pub poll_interval_ms: u64,

    /// Bytes drained from one connection per poll quantum.
    ///
    /// Default: 256
    pub drain_chunk: usize,

    /// Seconds allowed for the HTTP upgrade request to arrive.
    ///
    /// Default: 10
    pub handshake_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: "/ws".to_string(),
            limits: Limits::default(),
            keep_alive: KeepAlive::default(),
            ring_buffer_capacity: 1024,
            max_connections: 4,
            send_queue_capacity: 32,
            poll_interval_ms: 10,
            drain_chunk: 256,
            handshake_timeout: 10,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is not valid JSON for this schema or fails [`Config::validate`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `WSTERM_*` environment variable overrides.
    ///
    /// Recognized: `WSTERM_BIND_ADDR`, `WSTERM_WS_PATH`, `WSTERM_IDLE_THRESHOLD`,
    /// `WSTERM_PROBE_INTERVAL`, `WSTERM_MAX_MISSED_PINGS`,
    /// `WSTERM_RING_BUFFER_CAPACITY`, `WSTERM_MAX_CONNECTIONS`,
    /// `WSTERM_MAX_FRAME_SIZE`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but does not parse.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_PREFIX}{key}: cannot parse {value:?}")))
        }

        if let Some(v) = lookup("BIND_ADDR") {
            self.bind_addr = parse("BIND_ADDR", &v)?;
        }
        if let Some(v) = lookup("WS_PATH") {
            self.ws_path = v;
        }
        if let Some(v) = lookup("IDLE_THRESHOLD") {
            self.keep_alive.idle_threshold = parse("IDLE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("PROBE_INTERVAL") {
            self.keep_alive.probe_interval = parse("PROBE_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("MAX_MISSED_PINGS") {
            self.keep_alive.max_missed_pings = parse("MAX_MISSED_PINGS", &v)?;
        }
        if let Some(v) = lookup("RING_BUFFER_CAPACITY") {
            self.ring_buffer_capacity = parse("RING_BUFFER_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("MAX_CONNECTIONS") {
            self.max_connections = parse("MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("MAX_FRAME_SIZE") {
            self.limits.max_frame_size = parse("MAX_FRAME_SIZE", &v)?;
        }
        Ok(self)
    }

    /// Check cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("ringBufferCapacity", self.ring_buffer_capacity),
            ("maxConnections", self.max_connections),
            ("sendQueueCapacity", self.send_queue_capacity),
            ("drainChunk", self.drain_chunk),
            ("maxFrameSize", self.limits.max_frame_size),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("{name} must be greater than zero")));
        }
        if self.keep_alive.probe_interval == 0 {
            return Err(Error::Config("probeInterval must be greater than zero".into()));
        }
        if self.keep_alive.max_missed_pings == 0 {
            return Err(Error::Config("maxMissedPings must be greater than zero".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("pollIntervalMs must be greater than zero".into()));
        }
        if !self.ws_path.starts_with('/') {
            return Err(Error::Config(format!(
                "wsPath must start with '/', got {:?}",
                self.ws_path
            )));
        }
        Ok(())
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set keep-alive parameters.
    #[must_use]
    pub const fn with_keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set ring relay capacity per connection.
    #[must_use]
    pub const fn with_ring_buffer_capacity(mut self, capacity: usize) -> Self {
        self.ring_buffer_capacity = capacity;
        self
    }

    /// Set the connection cap.
    #[must_use]
    pub const fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set outbound queue depth per connection.
    #[must_use]
    pub const fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    /// Set the listen address.
    #[must_use]
    pub const fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the upgrade path.
    #[must_use]
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Set the shell poll cadence.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Shell poll cadence as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 16 * 1024);
        assert_eq!(limits.max_handshake_size, 8192);
    }

    #[test]
    fn test_limits_check_frame_size() {
        let limits = Limits::default();
        assert!(limits.check_frame_size(1024).is_ok());
        assert!(limits.check_frame_size(16 * 1024).is_ok());
        assert!(matches!(
            limits.check_frame_size(16 * 1024 + 1),
            Err(Error::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_limits_check_handshake_size() {
        let limits = Limits::embedded();
        assert!(limits.check_handshake_size(1024).is_ok());
        assert!(matches!(
            limits.check_handshake_size(4096),
            Err(Error::HandshakeTooLarge { size: 4096, max: 2048 })
        ));
    }

    #[test]
    fn test_keep_alive_durations() {
        let ka = KeepAlive::new(5, 5, 2);
        assert_eq!(ka.idle_threshold(), Duration::from_secs(5));
        assert_eq!(ka.probe_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_ring_buffer_capacity(64)
            .with_keep_alive(KeepAlive::new(5, 5, 2))
            .with_poll_interval(Duration::from_millis(20));

        assert_eq!(config.ring_buffer_capacity, 64);
        assert_eq!(config.keep_alive.max_missed_pings, 2);
        assert_eq!(config.poll_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"idleThreshold": 5, "probeInterval": 5, "maxMissedPings": 2, "ringBufferCapacity": 64}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.keep_alive, KeepAlive::new(5, 5, 2));
        assert_eq!(config.ring_buffer_capacity, 64);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.limits, Limits::default());
    }

    #[test]
    fn test_config_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wsterm.json");
        std::fs::write(&path, r#"{"maxConnections": 8, "wsPath": "/term"}"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.ws_path, "/term");
    }

    #[test]
    fn test_config_from_json_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wsterm.json");
        std::fs::write(&path, r#"{"ringBufferCapacity": 0}"#).unwrap();

        assert!(matches!(
            Config::from_json_file(&path),
            Err(Error::Config(msg)) if msg.contains("ringBufferCapacity")
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("IDLE_THRESHOLD", "7"),
            ("MAX_CONNECTIONS", "2"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .apply_overrides(|k| vars.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.keep_alive.idle_threshold, 7);
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_override_parse_failure() {
        let result = Config::default()
            .apply_overrides(|k| (k == "MAX_MISSED_PINGS").then(|| "lots".to_string()));
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("MAX_MISSED_PINGS")));
    }

    #[test]
    fn test_eviction_deadline() {
        assert_eq!(KeepAlive::new(5, 5, 2).eviction_deadline(), Duration::from_secs(10));
        assert_eq!(KeepAlive::new(10, 5, 3).eviction_deadline(), Duration::from_secs(20));
        assert_eq!(KeepAlive::new(1, 1, 1).eviction_deadline(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_ws_path() {
        let config = Config::new().with_ws_path("ws");
        assert!(config.validate().is_err());
    }
}
