//! Configuration management
//!
//! Separates startup configuration (read once, handed to each component at
//! construction) from runtime configuration (published through a watch
//! channel so components pick up updates without a global).

use config::{Config, Environment, File};
use log::{debug, info};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;

/// Default location of the configuration file, without extension.
pub const DEFAULT_CONFIG_PATH: &str = "config";

/// Prefix for environment overrides, e.g. `CONFINE_DATA_DIRECTORY`.
pub const ENV_PREFIX: &str = "CONFINE";

/// Complete daemon configuration with startup/runtime separation
#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    #[serde(flatten)]
    pub startup: StartupConfig,

    #[serde(flatten)]
    pub runtime: RuntimeConfig,
}

/// What a directory walk does when a nested directory cannot be listed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnreadablePolicy {
    /// The directory contributes zero bytes and the walk continues.
    #[default]
    Skip,
    /// The first nested failure aborts the walk.
    Fail,
}

/// Configuration that requires a restart to take effect
#[derive(Debug, Deserialize, Clone)]
pub struct StartupConfig {
    /// Directory holding one subdirectory per server.
    pub data_directory: String,

    /// Maximum number of directory listings in flight at once, across all servers.
    pub walk_concurrency: usize,

    /// Handling of nested directories that fail to list during a walk.
    #[serde(default)]
    pub unreadable_directories: UnreadablePolicy,
}

/// Configuration that can be updated while the daemon is running
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Seconds a computed disk usage figure is trusted. Zero disables disk checking.
    pub disk_check_interval: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            disk_check_interval: 300,
        }
    }
}

impl RuntimeConfig {
    /// Get the disk check interval as a Duration
    pub fn disk_check_interval(&self) -> Duration {
        Duration::from_secs(self.disk_check_interval)
    }

    /// Returns false when usage checks have been switched off.
    pub fn disk_checking_enabled(&self) -> bool {
        self.disk_check_interval > 0
    }
}

/// Owner side of the runtime configuration channel.
///
/// Components hold a `watch::Receiver<RuntimeConfig>` obtained from
/// [`RuntimeHandle::subscribe`] and read the current value on each use.
#[derive(Debug)]
pub struct RuntimeHandle {
    tx: watch::Sender<RuntimeConfig>,
}

impl RuntimeHandle {
    pub fn new(runtime: RuntimeConfig) -> Self {
        let (tx, _rx) = watch::channel(runtime);
        Self { tx }
    }

    /// Applies `callback` to the current runtime configuration and notifies subscribers.
    pub fn update<F>(&self, callback: F)
    where
        F: FnOnce(&mut RuntimeConfig),
    {
        self.tx.send_modify(callback);
        debug!("runtime configuration updated: {:?}", *self.tx.borrow());
    }

    pub fn subscribe(&self) -> watch::Receiver<RuntimeConfig> {
        self.tx.subscribe()
    }

    /// Snapshot of the current runtime configuration.
    pub fn current(&self) -> RuntimeConfig {
        self.tx.borrow().clone()
    }
}

impl DaemonConfig {
    /// Load configuration from `config.toml` (if present) with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH, false)
    }

    /// Load configuration from an explicit file, which must exist
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        Self::load_from(path, true)
    }

    fn load_from(path: &str, required: bool) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .set_default("data_directory", "/var/lib/daemon/volumes")?
            .set_default("walk_concurrency", 64_i64)?
            .set_default("unreadable_directories", "skip")?
            .set_default("disk_check_interval", 300_i64)?
            .add_source(File::with_name(path).required(required))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: DaemonConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Split into startup (immutable) and runtime (watched) parts
    pub fn split(self) -> (StartupConfig, RuntimeHandle) {
        (self.startup, RuntimeHandle::new(self.runtime))
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.startup.data_directory.is_empty() {
            return Err(config::ConfigError::Message(
                "data_directory cannot be empty".into(),
            ));
        }

        if self.startup.walk_concurrency == 0 {
            return Err(config::ConfigError::Message(
                "walk_concurrency must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl StartupConfig {
    /// Get the data directory as PathBuf
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_directory)
    }

    /// Ensures the data directory exists and records its real path.
    ///
    /// Every resolved server path is compared against the data directory, so
    /// a symlinked data directory must be replaced with its target here or
    /// every lookup would be rejected as an escape.
    pub fn prepare_data_directory(&mut self) -> io::Result<()> {
        let path = self.data_path();
        debug!("ensuring server data directory exists: {}", path.display());
        create_private_dir(&path)?;

        let real = std::fs::canonicalize(&path)?;
        if real != path {
            info!(
                "data directory {} is a symlink or relative, using {}",
                path.display(),
                real.display()
            );
            self.data_directory = real.to_string_lossy().into_owned();
        }

        Ok(())
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}
