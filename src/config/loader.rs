//! Configuration loader with environment variable support

use super::Config;
use crate::error::Result;
use config::{Environment, File};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `COMMUNITY_GATEWAY__JWT__SECRET`
pub const ENV_PREFIX: &str = "COMMUNITY_GATEWAY";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = config::Config::builder()
        .add_source(File::from(path.as_ref()))
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Load configuration from a TOML file with environment variable overrides
///
/// The file is optional so a deployment can configure entirely through the
/// environment.
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = config::Config::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Config file location: `CONFIG_PATH` or `config.toml`
pub fn config_path() -> PathBuf {
    std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
