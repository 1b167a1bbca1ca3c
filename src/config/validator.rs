//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use crate::common::log::validate_level;
use crate::common::{MirrorError, Result};
use crate::config::{Config, MirrorConfig};
use crate::net::{split_proxy_chain, Endpoint, ProxySpec};

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_level(&config.log_level)?;

    if config.mirrors.is_empty() {
        return Err(MirrorError::Config("no mirror configuration".to_string()));
    }

    for (idx, mirror) in config.mirrors.iter().enumerate() {
        validate_mirror(mirror).map_err(|e| {
            MirrorError::Config(format!("mirror #{} ({} -> {}): {}", idx, mirror.local, mirror.target, e))
        })?;
    }

    Ok(())
}

/// Validate endpoint settings of one mirror
fn validate_mirror(mirror: &MirrorConfig) -> Result<()> {
    let local = Endpoint::parse(&mirror.local)?;
    if !local.is_stream() {
        return Err(MirrorError::UnsupportedNetwork(local.network));
    }

    let target = Endpoint::parse(&mirror.target)?;
    if !target.is_stream() {
        return Err(MirrorError::UnsupportedNetwork(target.network));
    }

    Ok(())
}

/// Configuration validator trait
pub trait ConfigValidator {
    /// Check configuration for warnings
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for Config {
    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (idx, mirror) in self.mirrors.iter().enumerate() {
            if mirror.local == mirror.target {
                warnings.push(format!(
                    "mirror #{}: local and target are the same endpoint: {}",
                    idx, mirror.local
                ));
            }

            // Bad entries are skipped at connect time, the chain still works
            for entry in split_proxy_chain(&mirror.proxy) {
                if let Err(e) = ProxySpec::parse(&entry) {
                    warnings.push(format!("mirror #{}: proxy entry will be skipped: {}", idx, e));
                }
            }
        }

        warnings
    }
}
