use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration shared by the balancer and signaling roles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
    pub discovery: DiscoveryConfig,
    pub balancer: BalancerConfig,
    pub signaling: SignalingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Shared registry connection.
///
/// An empty `url` runs against an in-process registry, which is only
/// useful for a single balancer and signaling server in one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    /// Prepended to `server:{id}` and `room:{roomId}` keys
    pub key_prefix: String,
    pub operation_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: String::new(),
            operation_timeout_ms: 5000,
        }
    }
}

impl RedisConfig {
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Balancer-side server discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How often the registry is polled
    pub refresh_interval_ms: u64,
    /// Maximum report age before a server is evicted
    pub server_timeout_ms: u64,
    /// Cost of one room relative to one peer in the load score
    pub room_weight: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 5000,
            server_timeout_ms: 15000,
            room_weight: 10,
        }
    }
}

impl DiscoveryConfig {
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    #[must_use]
    pub const fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// URL returned for servers that do not advertise one
    pub fallback_url: String,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            fallback_url: "ws://localhost:3001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Registry id of this server; generated from the hostname when unset
    pub server_id: Option<String>,
    /// WebSocket URL handed to clients by the balancer
    pub advertised_url: Option<String>,
    pub report_interval_ms: u64,
    pub sweep_interval_ms: u64,
    /// Peers unseen for longer than this are expired by the sweeper
    pub peer_grace_ms: u64,
    pub ping_interval_ms: u64,
    /// Bound of each peer's outbound delivery queue
    pub peer_queue_capacity: usize,
    pub max_message_bytes: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_id: None,
            advertised_url: None,
            report_interval_ms: 5000,
            sweep_interval_ms: 5000,
            peer_grace_ms: 10000,
            ping_interval_ms: 5000,
            peer_queue_capacity: 256,
            max_message_bytes: 64 * 1024,
        }
    }
}

impl SignalingConfig {
    #[must_use]
    pub const fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    #[must_use]
    pub const fn peer_grace(&self) -> Duration {
        Duration::from_millis(self.peer_grace_ms)
    }

    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // ROOMGRID_REDIS__URL, ROOMGRID_SIGNALING__PEER_GRACE_MS, ...
        builder = builder.add_source(
            Environment::with_prefix("ROOMGRID")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Check settings that would make the background loops misbehave
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.discovery.refresh_interval_ms == 0 {
            errors.push("discovery.refresh_interval_ms must be greater than 0".to_string());
        }
        if self.discovery.server_timeout_ms <= self.discovery.refresh_interval_ms {
            errors.push(
                "discovery.server_timeout_ms must exceed discovery.refresh_interval_ms".to_string(),
            );
        }
        if self.signaling.report_interval_ms == 0 {
            errors.push("signaling.report_interval_ms must be greater than 0".to_string());
        }
        if self.signaling.sweep_interval_ms == 0 {
            errors.push("signaling.sweep_interval_ms must be greater than 0".to_string());
        }
        if self.signaling.ping_interval_ms == 0 {
            errors.push("signaling.ping_interval_ms must be greater than 0".to_string());
        }
        if self.signaling.peer_grace_ms <= self.signaling.ping_interval_ms {
            errors.push(
                "signaling.peer_grace_ms must exceed signaling.ping_interval_ms".to_string(),
            );
        }
        if self.signaling.peer_queue_capacity == 0 {
            errors.push("signaling.peer_queue_capacity must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP listen address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery.server_timeout(), Duration::from_secs(15));
        assert_eq!(config.discovery.refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.signaling.peer_grace(), Duration::from_secs(10));
        assert_eq!(config.discovery.room_weight, 10);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = Config::default();
        config.signaling.peer_queue_capacity = 0;
        config.signaling.peer_grace_ms = 1000;
        config.discovery.refresh_interval_ms = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("peer_queue_capacity")));
        assert!(errors.iter().any(|e| e.contains("peer_grace_ms")));
        assert!(errors.iter().any(|e| e.contains("refresh_interval_ms")));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 3101\n\n[redis]\nurl = \"\"\n\n[signaling]\nserver_id = \"sig-a\"\npeer_grace_ms = 20000"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 3101);
        assert!(config.redis.url.is_empty());
        assert_eq!(config.signaling.server_id.as_deref(), Some("sig-a"));
        assert_eq!(config.signaling.peer_grace_ms, 20000);
        // untouched sections keep their defaults
        assert_eq!(config.discovery.server_timeout_ms, 15000);
    }

    #[test]
    fn test_http_address() {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 3001;
        assert_eq!(config.http_address(), "127.0.0.1:3001");
    }
}
