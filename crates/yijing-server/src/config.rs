//! Configuration for the divination hub.
//!
//! Settings come from a JSON file (default `config.json`). When the file
//! does not exist a default one is written. A few environment variables
//! override the file afterwards:
//!
//! - `YIJING_BIND_ADDR` (default: "0.0.0.0")
//! - `YIJING_PORT`      (default: "8090")
//!
//! The core only ever reads a `Config`; nothing mutates it after startup.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use yijing_protocol::wire_types::HEARTBEAT_INTERVAL_MS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub connection: ConnectionConfig,
    pub onebot: OneBotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// HTTP port to listen on.
    pub port: u16,

    /// Base URL for image references. Defaults to `http://localhost:<port>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    /// Directory of rendered images, served under `/output/`.
    pub output_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0".to_string(),
            port: 8090,
            public_url: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

/// Liveness and buffering parameters shared by both transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Inactivity deadline, refreshed by every inbound frame.
    pub read_timeout_ms: u64,

    /// Deadline for a single outbound write.
    pub write_timeout_ms: u64,

    /// Period of transport-level pings.
    pub ping_interval_ms: u64,

    /// Period of the generic hub heartbeat broadcast.
    pub hub_tick_ms: u64,

    /// Outbound mailbox size per connection.
    pub mailbox_capacity: usize,

    /// Command inbox size of each hub loop.
    pub hub_inbox_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            read_timeout_ms: 120_000,
            write_timeout_ms: 30_000,
            ping_interval_ms: 54_000,
            hub_tick_ms: 30_000,
            mailbox_capacity: 256,
            hub_inbox_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OneBotConfig {
    /// Identity reported as `self_id` / `user_id`.
    pub self_id: i64,

    pub nickname: String,

    /// Period of bot heartbeat events.
    pub heartbeat_interval_ms: u64,
}

impl Default for OneBotConfig {
    fn default() -> Self {
        OneBotConfig {
            self_id: 12_345_678,
            nickname: "yijing-bot".to_string(),
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS as u64,
        }
    }
}

impl Config {
    /// Load `path`, writing a default file first if it is missing, then
    /// apply environment overrides and validate.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            info!(path = %path.display(), "config file missing, writing defaults");
            let config = Config::default();
            config.write_to(path)?;
            config
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        fs::write(path, text).map_err(io_err)
    }

    /// Apply `YIJING_BIND_ADDR` / `YIJING_PORT` when set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(addr) = env::var("YIJING_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        self.server.port = read_env_or_default("YIJING_PORT", self.server.port)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        let c = &self.connection;
        if c.read_timeout_ms == 0
            || c.write_timeout_ms == 0
            || c.ping_interval_ms == 0
            || c.hub_tick_ms == 0
            || self.onebot.heartbeat_interval_ms == 0
        {
            return Err(ConfigError::Invalid("timeouts and intervals must be non-zero".into()));
        }
        if c.mailbox_capacity == 0 || c.hub_inbox_capacity == 0 {
            return Err(ConfigError::Invalid("capacities must be non-zero".into()));
        }
        if c.ping_interval_ms >= c.read_timeout_ms {
            return Err(ConfigError::Invalid(
                "ping interval must be shorter than the read timeout".into(),
            ));
        }
        Ok(())
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.server.bind_addr, self.server.port)
    }

    /// Base URL that image references are built on.
    pub fn public_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.server.port),
        }
    }
}

impl ConnectionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn hub_tick(&self) -> Duration {
        Duration::from_millis(self.hub_tick_ms)
    }
}

impl OneBotConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

fn read_env_or_default<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(val) => val.parse::<T>().map_err(|_| ConfigError::Env { key, value: val }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.connection.read_timeout_ms, 120_000);
        assert_eq!(config.onebot.heartbeat_interval_ms, 5000);

        let written = Config::from_file(&path).unwrap();
        assert_eq!(written.server.bind_addr, config.server.bind_addr);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"server":{"port":9100},"onebot":{"self_id":7}}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.onebot.self_id, 7);
        assert_eq!(config.connection.mailbox_capacity, 256);
        assert_eq!(config.public_url(), "http://localhost:9100");
        assert_eq!(config.server.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn broken_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();

        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn ping_must_fire_before_read_deadline() {
        let mut config = Config::default();
        config.connection.ping_interval_ms = config.connection.read_timeout_ms;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn public_url_strips_trailing_slash() {
        let mut config = Config::default();
        config.server.public_url = Some("https://divine.example/".to_string());
        assert_eq!(config.public_url(), "https://divine.example");
    }
}
