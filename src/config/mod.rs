//! Configuration management for the logline server
//!
//! Configuration is resolved in layers: built-in defaults, an optional TOML
//! file, then environment variables. Command-line flags are applied on top by
//! the binary.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default broadcast topic shared by every server process
pub const DEFAULT_CHANNEL: &str = "document-updates";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP / WebSocket listener configuration
    pub server: ServerConfig,

    /// Broadcast transport configuration
    pub redis: RedisConfig,

    /// Code execution side channel
    pub execution: ExecutionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Listening port
    pub port: u16,

    /// Enable permissive CORS
    pub enable_cors: bool,

    /// Enable per-request tracing
    pub enable_request_logging: bool,

    /// Events queued per connection before it is cut off as stalled
    pub outbox_capacity: usize,
}

/// Redis pub/sub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Pub/sub channel carrying document updates
    pub channel: String,

    /// Publisher connection pool size
    pub pool_size: usize,
}

/// Subprocess limits for the execution gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Run step timeout for interpreted languages and compiled binaries
    pub run_timeout_secs: u64,

    /// Run step timeout for toolchains that compile on the fly (go run, ts-node)
    pub slow_run_timeout_secs: u64,

    /// Compile step timeout (javac, g++)
    pub compile_timeout_secs: u64,

    /// Compile step timeout for rustc
    pub rust_compile_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 3001,
            enable_cors: true,
            enable_request_logging: true,
            outbox_capacity: 256,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://localhost:6379"),
            channel: String::from(DEFAULT_CHANNEL),
            pool_size: 8,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: 5,
            slow_run_timeout_secs: 10,
            compile_timeout_secs: 10,
            rust_compile_timeout_secs: 30,
        }
    }
}

impl ExecutionConfig {
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    #[must_use]
    pub fn slow_run_timeout(&self) -> Duration {
        Duration::from_secs(self.slow_run_timeout_secs)
    }

    #[must_use]
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    #[must_use]
    pub fn rust_compile_timeout(&self) -> Duration {
        Duration::from_secs(self.rust_compile_timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load defaults, then an optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Override fields from the process environment
    ///
    /// Unparseable values are ignored and the previous layer wins.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("LOGLINE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("PORT") {
            self.server.port = port;
        }
        if let Some(cors) = env_parse::<bool>("LOGLINE_CORS") {
            self.server.enable_cors = cors;
        }
        if let Some(logging) = env_parse::<bool>("LOGLINE_REQUEST_LOGGING") {
            self.server.enable_request_logging = logging;
        }
        if let Some(capacity) = env_parse::<usize>("LOGLINE_OUTBOX_CAPACITY") {
            self.server.outbox_capacity = capacity;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.redis.url = url;
        }
        if let Ok(channel) = std::env::var("LOGLINE_CHANNEL") {
            self.redis.channel = channel;
        }
        if let Some(size) = env_parse::<usize>("REDIS_POOL_SIZE") {
            self.redis.pool_size = size;
        }
        if let Ok(level) = std::env::var("LOGLINE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOGLINE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "must be greater than 0"));
        }

        self.bind_address()?;

        if self.redis.channel.trim().is_empty() {
            return Err(ConfigError::invalid("redis.channel", "must not be empty"));
        }

        // Every join queues document:init and presence:update
        if self.server.outbox_capacity < 2 {
            return Err(ConfigError::invalid("server.outbox_capacity", "must be at least 2"));
        }

        if self.redis.pool_size == 0 {
            return Err(ConfigError::invalid("redis.pool_size", "must be greater than 0"));
        }

        let timeouts = [
            ("execution.run_timeout_secs", self.execution.run_timeout_secs),
            ("execution.slow_run_timeout_secs", self.execution.slow_run_timeout_secs),
            ("execution.compile_timeout_secs", self.execution.compile_timeout_secs),
            (
                "execution.rust_compile_timeout_secs",
                self.execution.rust_compile_timeout_secs,
            ),
        ];
        for (field, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::invalid(field, "must be greater than 0"));
            }
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::invalid(
                "logging.format",
                format!("unknown format '{}', expected text or json", self.logging.format),
            ));
        }

        Ok(())
    }

    /// Socket address the server listens on
    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.host.parse().map_err(|_| {
            ConfigError::invalid("server.host", format!("invalid address: {}", self.server.host))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config file {path}: {reason}")]
    Parse { path: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
