//! Logging utilities
//!
//! Initializes the `env_logger` backend behind the `log` facade.

use std::fs::OpenOptions;
use std::io::Write;

use super::error::{MirrorError, Result};

/// Accepted log level names
pub const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Where log lines are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
    /// Append to a file
    File(String),
}

impl LogOutput {
    /// Interpret a `log_file` setting: `stdout`, `stderr` or a path
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "stdout" => Self::Stdout,
            "stderr" => Self::Stderr,
            path => Self::File(path.to_string()),
        }
    }
}

/// Check that `level` is a known log level name
pub fn validate_level(level: &str) -> Result<()> {
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(MirrorError::Config(format!(
            "Invalid log level: {}. Valid values are: {}",
            level,
            LOG_LEVELS.join(", ")
        )))
    }
}

/// Initialize the logging system
///
/// # Parameters
///
/// * `level` - Log level, `RUST_LOG` still takes precedence
/// * `output` - Log destination
pub fn init_logger(level: &str, output: &LogOutput) -> Result<()> {
    validate_level(level)?;

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);
    let mut builder = env_logger::Builder::from_env(env);

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    match output {
        LogOutput::Stdout => {
            builder.target(env_logger::Target::Stdout);
        }
        LogOutput::Stderr => {
            builder.target(env_logger::Target::Stderr);
        }
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| MirrorError::Config(format!("Failed to open log file {}: {}", path, e)))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
    }

    builder
        .try_init()
        .map_err(|e| MirrorError::Config(format!("Failed to initialize logger: {}", e)))
}
