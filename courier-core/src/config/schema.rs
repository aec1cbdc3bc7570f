//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default request timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Root configuration for courier
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Messenger configuration
    #[serde(default)]
    pub messenger: MessengerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Messenger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// Default request timeout in milliseconds
    #[serde(default = "default_timeout_ms", alias = "timeout")]
    pub timeout_ms: u64,
    /// Activate the transport subscription when the messenger is built
    #[serde(default, alias = "autoActive")]
    pub auto_active: bool,
    /// Give requests without a `requestId` a generated one
    #[serde(default, alias = "autoGenerateRequestId")]
    pub auto_generate_request_id: bool,
    /// Remove a request from the correlation store when it times out
    #[serde(default = "default_true", alias = "clearTimeoutReq")]
    pub clear_timeout_req: bool,
    /// Resolve timed-out requests with their default response, if any
    #[serde(default, alias = "enableDefaultResponse")]
    pub enable_default_response: bool,
    /// Warn about inbound messages nobody handles
    #[serde(default = "default_true", alias = "logUnhandledEvent")]
    pub log_unhandled_event: bool,
    /// Per-request diagnostics
    #[serde(default = "default_true", alias = "enableLog")]
    pub enable_log: bool,
    /// Resolve requests with the reply's `data` field only
    #[serde(default, alias = "useResDataOnly")]
    pub use_res_data_only: bool,
}

impl MessengerConfig {
    /// Default request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            auto_active: false,
            auto_generate_request_id: false,
            clear_timeout_req: true,
            enable_default_response: false,
            log_unhandled_event: true,
            enable_log: true,
            use_res_data_only: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}
