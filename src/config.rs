//! Configuration System
//!
//! Layered configuration for the fetch collaborator, the response cache and
//! logging. Sources, lowest precedence first: built-in defaults, the global
//! config file, project config files, an explicit file, then `RELAY_HOST__*`
//! environment variables.

use crate::error::ConfigError;
use crate::fetch::{CacheConfig, FetchConfig};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Err(e) = self.fetch.validate() {
            errors.push(format!("fetch: {}", e));
        }
        if let Err(e) = self.cache.validate() {
            errors.push(format!("cache: {}", e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(format!("logging: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Render as TOML, e.g. for `relay-host config`
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}
