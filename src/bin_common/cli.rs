//! CLI utilities for binaries
//!
//! Handles configuration path resolution and arguments
//! for all binary executables.

use std::path::PathBuf;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Depth feed configuration (config/depthsync.yaml)
    Depth,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Depth => "config/depthsync.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Depth | ConfigType::Custom(_) => "DEPTHSYNC_CONFIG_PATH",
        }
    }
}

/// Resolve a config path: a `--config <path>` argument wins over the
/// environment, which wins over the default
///
/// # Examples
/// ```
/// use depthsync::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Depth);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = &config_type {
        return path.into();
    }
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Config type selected by `--config <path>` in `args`, or the default
pub fn config_type_from_args(args: &[String], default: ConfigType) -> ConfigType {
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|path| ConfigType::Custom(path.clone()))
        .unwrap_or(default)
}
