//! Configuration management for the AkiDB data coordinator
//!
//! Sources, lowest precedence first:
//! - Hardcoded defaults
//! - /etc/akidb/datacoord.yaml
//! - ./config/datacoord.yaml
//! - File named by the AKIDB_DATACOORD_CONFIG env var
//! - Environment variables (`AKIDB_DATACOORD__GC__CHECK_INTERVAL_SECS=60`)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure for the data coordinator
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DataCoordConfig {
    #[serde(default)]
    pub gc: GcConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl DataCoordConfig {
    /// Load configuration from every source, then validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?;

        builder = builder
            .add_source(File::with_name("/etc/akidb/datacoord").required(false))
            .add_source(File::with_name("./config/datacoord").required(false));

        if let Ok(config_path) = std::env::var("AKIDB_DATACOORD_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("AKIDB_DATACOORD")
                .separator("__")
                .try_parsing(true),
        );

        let config: DataCoordConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(?config, "Loaded data coordinator configuration");
        Ok(config)
    }

    /// Load configuration from a specific file path on top of the defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: DataCoordConfig = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let gc = GcConfig::default();
        builder
            .set_default("gc.enabled", gc.enabled)?
            .set_default("gc.check_interval_secs", gc.check_interval_secs)?
            .set_default("gc.missing_tolerance_secs", gc.missing_tolerance_secs)?
            .set_default("gc.drop_tolerance_secs", gc.drop_tolerance_secs)?
            .set_default("storage.root_path", StorageConfig::default().root_path)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gc.check_interval_secs == 0 {
            return Err(ConfigError::Message(
                "gc.check_interval_secs must be > 0".to_string(),
            ));
        }

        if self.storage.root_path.ends_with('/') {
            return Err(ConfigError::Message(
                "storage.root_path must not end with '/'".to_string(),
            ));
        }

        Ok(())
    }
}

/// Garbage collector options
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GcConfig {
    /// Turns the background worker on or off
    pub enabled: bool,

    /// Tick period in seconds
    pub check_interval_secs: u64,

    /// Grace period before an object unknown to metadata is deleted
    pub missing_tolerance_secs: u64,

    /// Grace period before a dropped segment is reclaimed
    pub drop_tolerance_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 3600,
            missing_tolerance_secs: 86400,
            drop_tolerance_secs: 86400,
        }
    }
}

impl GcConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn missing_tolerance(&self) -> Duration {
        Duration::from_secs(self.missing_tolerance_secs)
    }

    pub fn drop_tolerance(&self) -> Duration {
        Duration::from_secs(self.drop_tolerance_secs)
    }
}

/// Object storage layout configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root path every storage key is relative to
    pub root_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_path: "files".to_string(),
        }
    }
}
