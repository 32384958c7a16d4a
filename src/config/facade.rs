//! Config loader: assembles the sources in precedence order.

use super::merge::merge_policy;
use super::sources::{env_vars, global_file, project_file};
use super::HostConfig;
use crate::error::ConfigError;
use config::File;
use std::path::Path;
use tracing::debug;

/// Loads `HostConfig` from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a project directory
    pub fn load(project_root: &Path) -> Result<HostConfig, ConfigError> {
        Self::load_with(Some(project_root), None)
    }

    /// Load configuration from one file, on top of defaults and under env vars
    pub fn load_from_file(path: &Path) -> Result<HostConfig, ConfigError> {
        Self::load_with(None, Some(path))
    }

    /// Defaults, global file, project files, explicit file, env vars
    pub fn load_with(
        project_root: Option<&Path>,
        explicit: Option<&Path>,
    ) -> Result<HostConfig, ConfigError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        if let Some(root) = project_root {
            builder = project_file::add_to_builder(builder, root)?;
        }
        if let Some(path) = explicit {
            debug!(config_path = %path.display(), "Loading explicit configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = env_vars::add_to_builder(builder);

        let config: HostConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
