use config::{self, Environment, File};
use log::{debug, error};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, WatchError};
#[cfg(feature = "icmp")]
use crate::icmp::PingConfig;
#[cfg(feature = "process")]
use crate::process::{MIN_FRAME_SIZE, WatchConfig};

/// Prefix of environment variables overriding file settings,
/// e.g. `PROCWATCH_WATCH__FRAME_SIZE=4096`
pub const ENV_PREFIX: &str = "PROCWATCH";

/// Settings for frame watching
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WatchSettings {
    /// Requested bytes per read
    pub frame_size: usize,
    /// Delay before each read in milliseconds
    pub delay_ms: Option<u64>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            delay_ms: None,
        }
    }
}

#[cfg(feature = "process")]
impl WatchSettings {
    /// Frame size after clamping
    pub fn effective_frame_size(&self) -> usize {
        self.frame_size.max(MIN_FRAME_SIZE)
    }

    /// A watch configuration carrying these settings and no callbacks
    pub fn to_watch_config(&self) -> WatchConfig {
        let config = WatchConfig::default().frame_size(self.frame_size);
        match self.delay_ms {
            Some(ms) if ms > 0 => config.delay(Duration::from_millis(ms)),
            _ => config,
        }
    }
}

/// Application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Frame watching settings
    #[serde(default)]
    pub watch: WatchSettings,
    /// Default ping settings
    #[cfg(feature = "icmp")]
    #[serde(default)]
    pub ping: PingConfig,
}

/// Logging level
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Load application configuration from a file, then apply `PROCWATCH_*`
/// environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    load_config_with_prefix(path, ENV_PREFIX)
}

/// Load application configuration from a file, then apply environment
/// overrides with the given prefix
pub fn load_config_with_prefix<P: AsRef<Path>>(path: P, prefix: &str) -> Result<AppConfig> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    // Check if the file exists
    if !path.exists() {
        error!("Configuration file {} does not exist", path.display());
        return Err(WatchError::Config(format!("Configuration file not found: {}", path.display())).into());
    }

    // Get the file extension
    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => {
            error!("Configuration file has no extension");
            return Err(WatchError::Config(format!("Configuration file has no extension: {}", path.display())).into());
        }
    };

    let format = match extension.as_str() {
        "toml" => config::FileFormat::Toml,
        "json" => config::FileFormat::Json,
        "yaml" | "yml" => config::FileFormat::Yaml,
        format => {
            error!("Unsupported configuration format: {}", format);
            return Err(WatchError::Config(format!("Unsupported config format: {}", format)).into());
        }
    };

    let config = config::Config::builder()
        .add_source(File::from(path).format(format))
        .add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| WatchError::Config(e.to_string()))?;

    let config = config
        .try_deserialize()
        .map_err(|e| WatchError::Config(e.to_string()))?;
    Ok(config)
}
