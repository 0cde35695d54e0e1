//! # Configuration Management
//!
//! Centralized configuration for the gate bridge.
//!
//! This module provides structured configuration for the gate connection, the
//! input queue, the dispatch worker pool, the gate credentials, the chat webhook
//! and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` / `apply_env()`
//!
//! ## Wire Constants
//! The frame layout constants live here as well, next to the command ids the
//! gate server reserves for the login exchange.

use crate::error::{constants, BridgeError, Result};
use crate::protocol::handshake::{CredentialSource, Credentials};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Fixed header tag carried by every frame
pub const HEADER_TAG: u32 = 0x8000_0000;

/// Length prefix + header tag + command
pub const FRAME_HEADER_LEN: usize = 8;

/// Hard cap on the length prefix of any outbound frame
pub const MAX_FRAME_SIZE: usize = 1024;

/// Login request command id
pub const CMD_LOGIN: u16 = 8001;

/// Sent by the gate when the login is accepted
pub const CMD_AUTH_SUCCESS: u16 = 8501;

/// Sent by the gate when the login is refused, followed by a reason string
pub const CMD_AUTH_FAIL: u16 = 8502;

/// Player chat line relayed from the gate
pub const CMD_CHAT_RELAY: u16 = 1514;

/// Queue polled for actions by default
pub const DEFAULT_QUEUE_NAME: &str = "comm-module-input-q";

/// Environment variable holding the gate login name
pub const ENV_USERNAME: &str = "comm_username";

/// Environment variable holding the gate login password
pub const ENV_PASSWORD: &str = "comm_password";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BridgeConfig {
    /// Gate server connection
    #[serde(default)]
    pub gate: GateConfig,

    /// Input queue polling
    #[serde(default)]
    pub queue: QueueConfig,

    /// Dispatch pipeline
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Gate login
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Chat relay webhook
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("GATE_BRIDGE_GATE_ADDRESS") {
            self.gate.address = addr;
        }

        if let Ok(name) = std::env::var("GATE_BRIDGE_QUEUE_NAME") {
            self.queue.name = name;
        }

        if let Ok(workers) = std::env::var("GATE_BRIDGE_WORKERS") {
            if let Ok(val) = workers.parse::<usize>() {
                self.dispatch.workers = val;
            }
        }

        if let Ok(timeout) = std::env::var("GATE_BRIDGE_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                self.gate.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(user) = std::env::var(ENV_USERNAME) {
            self.credentials.username = Some(user);
        }

        if let Ok(pass) = std::env::var(ENV_PASSWORD) {
            self.credentials.password = Some(pass);
        }

        if let Ok(id) = std::env::var("playerChatWebhookId") {
            self.webhook.id = Some(id);
        }

        if let Ok(token) = std::env::var("playerChatWebhookToken") {
            self.webhook.token = Some(token);
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.gate.validate());
        errors.extend(self.queue.validate());
        errors.extend(self.dispatch.validate());
        errors.extend(self.webhook.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Gate server connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Gate server address (e.g., "127.0.0.1:8000")
    pub address: String,

    /// Timeout for the TCP connect
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Consecutive protocol errors tolerated before the reader gives up
    pub max_protocol_errors: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:8000"),
            connect_timeout: Duration::from_secs(10),
            max_protocol_errors: 16,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Gate address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid gate address format: '{}' (expected format: '127.0.0.1:8000')",
                self.address
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if self.max_protocol_errors == 0 {
            errors.push("Max protocol errors must be greater than 0".to_string());
        }

        errors
    }
}

/// Input queue settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue name
    pub name: String,

    /// Maximum messages fetched per receive call
    pub batch_size: usize,

    /// Capacity of the channel between the poller and the workers
    pub channel_capacity: usize,

    /// Delay before polling again after a receive failure or an empty batch
    #[serde(with = "duration_serde")]
    pub poll_backoff: Duration,

    /// How long a received message stays hidden before it is delivered again
    /// unless acknowledged
    #[serde(with = "duration_serde")]
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: String::from(DEFAULT_QUEUE_NAME),
            batch_size: 10,
            channel_capacity: 50,
            poll_backoff: Duration::from_secs(1),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("Queue name cannot be empty".to_string());
        }

        if self.batch_size == 0 || self.batch_size > 10 {
            errors.push(format!(
                "Invalid batch size: {} (valid range: 1-10)",
                self.batch_size
            ));
        }

        if self.channel_capacity == 0 {
            errors.push("Queue channel capacity must be greater than 0".to_string());
        }

        if self.poll_backoff.as_millis() < 10 {
            errors.push("Poll backoff too short (minimum: 10ms)".to_string());
        } else if self.poll_backoff.as_secs() > 60 {
            errors.push("Poll backoff too long (maximum: 60s)".to_string());
        }

        if self.visibility_timeout.as_secs() < 1 {
            errors.push("Visibility timeout too short (minimum: 1s)".to_string());
        } else if self.visibility_timeout.as_secs() > 12 * 60 * 60 {
            errors.push("Visibility timeout too long (maximum: 12h)".to_string());
        }

        errors
    }
}

/// What the outbound serializer does when a socket write fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteErrorPolicy {
    /// Stop the serializer and report the error
    #[default]
    Abort,
    /// Log the error and move on to the next frame. A frame that reached the
    /// write buffer is retried with the next flush.
    Continue,
}

/// Dispatch pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of concurrent encode workers
    pub workers: usize,

    /// Capacity of the outbound frame queue
    pub outbound_capacity: usize,

    /// Acknowledge messages naming an unknown action instead of leaving them for redelivery
    pub ack_unknown_actions: bool,

    /// Behaviour on socket write failure
    pub write_error_policy: WriteErrorPolicy,

    /// Gate events waiting for the command sink before new ones are dropped
    pub event_backlog: usize,

    /// Interval between metrics log lines (0 disables)
    #[serde(with = "duration_serde")]
    pub metrics_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            outbound_capacity: 20,
            ack_unknown_actions: false,
            write_error_policy: WriteErrorPolicy::Abort,
            event_backlog: 64,
            metrics_interval: Duration::from_secs(60),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.workers == 0 {
            errors.push("Worker count must be greater than 0".to_string());
        } else if self.workers > 1024 {
            errors.push(format!(
                "Worker count too large: {} (maximum: 1024)",
                self.workers
            ));
        }

        if self.outbound_capacity == 0 {
            errors.push("Outbound capacity must be greater than 0".to_string());
        }

        if self.event_backlog == 0 {
            errors.push("Event backlog must be greater than 0".to_string());
        }

        errors
    }
}

/// Gate login credentials
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl CredentialSource for CredentialsConfig {
    fn credentials(&self) -> Result<Credentials> {
        let username = self
            .username
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| BridgeError::ConfigError(constants::ERR_MISSING_USERNAME.into()))?;
        let password = self
            .password
            .clone()
            .ok_or_else(|| BridgeError::ConfigError(constants::ERR_MISSING_PASSWORD.into()))?;
        Ok(Credentials::new(username, password))
    }
}

/// Chat relay webhook settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Base URL; id and token are appended as path segments
    pub base_url: String,
    pub id: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://discord.com/api/webhooks"),
            id: None,
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl WebhookConfig {
    /// Both id and token are present
    pub fn is_enabled(&self) -> bool {
        self.id.is_some() && self.token.is_some()
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.id.is_some() != self.token.is_some() {
            errors.push("Webhook id and token must be set together".to_string());
        }

        if self.is_enabled() && !self.base_url.starts_with("http") {
            errors.push(format!("Invalid webhook base URL: '{}'", self.base_url));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,

    /// Whether to include ANSI colours
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("gate-bridge"),
            log_level: Level::INFO,
            json_format: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.json_format && self.ansi {
            errors.push("ANSI colours cannot be combined with JSON formatting".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
