//! Configuration loading functionality
//!
//! Configuration comes from a JSON file layered with `PORT_MIRROR_*`
//! environment overrides (e.g. `PORT_MIRROR_LOG_LEVEL`).

use std::path::Path;

use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment, File, FileFormat};
use log::debug;

use super::defaults::ENV_PREFIX;
use super::Config;
use crate::common::{MirrorError, Result};

impl Config {
    /// Load configuration from a JSON file
    ///
    /// Environment overrides are applied on top and mirror timeouts are
    /// defaulted afterwards.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let builder = ::config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Json).required(true));

        Self::build(builder).map_err(|e| {
            MirrorError::Config(format!(
                "Failed to load configuration file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let builder =
            ::config::Config::builder().add_source(File::from_str(content, FileFormat::Json));

        Self::build(builder)
            .map_err(|e| MirrorError::Config(format!("Failed to parse configuration: {}", e)))
    }

    fn build(
        builder: ConfigBuilder<DefaultState>,
    ) -> std::result::Result<Self, ::config::ConfigError> {
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply_defaults();
        Ok(config)
    }
}
