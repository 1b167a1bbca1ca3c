//! Configuration module
//!
//! This module handles application configuration: the JSON file layout,
//! loading with environment overrides, defaults and validation.

// Submodules
mod defaults;
mod loader;
mod validator;

pub use self::validator::{validate_config, ConfigValidator};
pub use defaults::{
    ALIVE_TIMEOUT_SECS, DEFAULT_CONFIG_FILE, ENV_PREFIX, LOG_FILE_STR, LOG_LEVEL_STR,
    READ_TIMEOUT_SECS, WRITE_TIMEOUT_SECS,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One mirror: a local listening endpoint relayed to a remote target
///
/// Timeouts are in seconds; non-positive values fall back to the defaults
/// (60 alive, 5 read, 30 write).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MirrorConfig {
    /// Local endpoint to listen on (`host:port` or `tcp://host:port`)
    pub local: String,

    /// Target endpoint every accepted connection is relayed to
    pub target: String,

    /// Comma or semicolon separated proxy chain, tried in order
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proxy: String,

    /// Both directions silent longer than this ends the session
    pub alive_timeout: i64,

    /// Deadline for a single read, also used as connect deadline
    pub read_timeout: i64,

    /// Deadline for a single write
    pub write_timeout: i64,
}

impl MirrorConfig {
    /// Create a mirror with default timeouts and no proxy
    pub fn new(local: impl Into<String>, target: impl Into<String>) -> Self {
        let mut config = Self {
            local: local.into(),
            target: target.into(),
            ..Self::default()
        };
        config.apply_defaults();
        config
    }

    /// Set the proxy chain
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = proxy.into();
        self
    }

    /// Set the three timeouts in seconds, applying defaults to non-positive values
    pub fn with_timeouts(mut self, alive: i64, read: i64, write: i64) -> Self {
        self.alive_timeout = alive;
        self.read_timeout = read;
        self.write_timeout = write;
        self.apply_defaults();
        self
    }

    /// Replace every non-positive timeout with its default
    pub fn apply_defaults(&mut self) {
        if self.alive_timeout <= 0 {
            self.alive_timeout = ALIVE_TIMEOUT_SECS as i64;
        }
        if self.read_timeout <= 0 {
            self.read_timeout = READ_TIMEOUT_SECS as i64;
        }
        if self.write_timeout <= 0 {
            self.write_timeout = WRITE_TIMEOUT_SECS as i64;
        }
    }

    /// Idle-alive timeout
    pub fn alive_timeout(&self) -> Duration {
        secs_or_default(self.alive_timeout, ALIVE_TIMEOUT_SECS)
    }

    /// Per-read timeout
    pub fn read_timeout(&self) -> Duration {
        secs_or_default(self.read_timeout, READ_TIMEOUT_SECS)
    }

    /// Per-write timeout
    pub fn write_timeout(&self) -> Duration {
        secs_or_default(self.write_timeout, WRITE_TIMEOUT_SECS)
    }
}

fn secs_or_default(value: i64, default: u64) -> Duration {
    if value > 0 {
        Duration::from_secs(value as u64)
    } else {
        Duration::from_secs(default)
    }
}

/// Process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log level (off, error, warn, info, debug, trace)
    pub log_level: String,

    /// Log destination: `stdout`, `stderr` or a file path
    pub log_file: String,

    /// Mirrors to start
    pub mirrors: Vec<MirrorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            log_file: defaults::log_file(),
            mirrors: Vec::new(),
        }
    }
}

impl Config {
    /// Apply timeout defaults to every mirror
    pub fn apply_defaults(&mut self) {
        for mirror in &mut self.mirrors {
            mirror.apply_defaults();
        }
    }

    /// Render the effective configuration for the startup log
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("<unprintable: {}>", e))
    }
}

/// Log the configuration
pub fn log_config(config: &Config) {
    use log::info;

    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("config: \n{}", config.to_json_pretty());
}
