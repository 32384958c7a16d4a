//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("fetch.base_url", "http://localhost:4000")?
        .set_default("fetch.path", "/graphql")?
        .set_default("cache.enabled", false)?
        .set_default("cache.capacity", 250)?
        .set_default("cache.ttl_secs", 60)
}
