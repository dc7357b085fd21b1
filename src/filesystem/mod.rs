//! Confined server filesystems
//!
//! Each server owns one directory below the data directory. Every path a
//! caller hands in goes through [`Filesystem::safe_path`] before any I/O, and
//! disk usage of the directory backs the server's quota checks.

pub mod resolver;
pub mod walker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::RuntimeConfig;
use crate::error::FsError;
use crate::quota::{KeyValueCache, QuotaCache};
use crate::utils::validation::is_valid_server_id;

pub use resolver::resolve;
pub use walker::DirectoryWalker;

/// The confined filesystem of a single server.
pub struct Filesystem {
    server_id: String,
    root: PathBuf,
    walker: DirectoryWalker,
    quota: QuotaCache,
}

impl Filesystem {
    /// Creates the filesystem for `server_id` below `data_directory`.
    ///
    /// `data_directory` must be a real path; see
    /// [`StartupConfig::prepare_data_directory`](crate::config::StartupConfig::prepare_data_directory).
    /// No directories are created.
    pub fn new(
        data_directory: &Path,
        server_id: &str,
        disk_limit: i64,
        walker: DirectoryWalker,
        cache: Arc<dyn KeyValueCache>,
        runtime: watch::Receiver<RuntimeConfig>,
    ) -> Result<Self, FsError> {
        if !is_valid_server_id(server_id) {
            return Err(FsError::InvalidServerId(server_id.to_string()));
        }

        Ok(Self {
            server_id: server_id.to_string(),
            root: data_directory.join(server_id),
            walker,
            quota: QuotaCache::new(server_id, disk_limit, cache, runtime),
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Returns the root path that contains all of the server's data.
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn quota(&self) -> &QuotaCache {
        &self.quota
    }

    /// Resolves `p` inside the server's directory, rejecting any escape.
    pub fn safe_path(&self, p: &str) -> Result<PathBuf, FsError> {
        resolver::resolve(&self.root, p)
    }

    /// Total size in bytes of `dir`, relative to the server's directory.
    pub async fn directory_size(&self, dir: &str) -> Result<u64, FsError> {
        self.walker.size(&self.root, dir).await
    }

    /// Disk usage in bytes, served from the cache while it is fresh.
    pub async fn disk_usage(&self) -> u64 {
        self.quota.usage(|| self.directory_size("/")).await
    }

    /// Returns true if the server has room left within its disk allowance.
    pub async fn has_space_available(&self) -> bool {
        self.quota
            .has_space_available(|| self.directory_size("/"))
            .await
    }
}
