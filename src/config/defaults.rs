//! Default configuration values
//!
//! Single source of truth for configuration defaults.

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "PORT_MIRROR";

/// Default configuration file
pub const DEFAULT_CONFIG_FILE: &str = "/etc/port-mirror.json";

/// Default log level
pub const LOG_LEVEL_STR: &str = "info";

/// Default log destination
pub const LOG_FILE_STR: &str = "stdout";

/// Default idle-alive timeout in seconds
pub const ALIVE_TIMEOUT_SECS: u64 = 60;

/// Default per-read timeout in seconds
pub const READ_TIMEOUT_SECS: u64 = 5;

/// Default per-write timeout in seconds
pub const WRITE_TIMEOUT_SECS: u64 = 30;

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default log destination
pub fn log_file() -> String {
    LOG_FILE_STR.to_string()
}
