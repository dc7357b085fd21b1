//! Server registry
//!
//! Tracks the confined filesystem of every server known to the daemon. All
//! filesystems share one directory-listing budget so concurrent walks across
//! servers stay within the configured limit.

use log::info;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore, watch};

use crate::config::{RuntimeConfig, StartupConfig, UnreadablePolicy};
use crate::error::FsError;
use crate::filesystem::{DirectoryWalker, Filesystem};
use crate::quota::MemoryCache;

/// Registry of server filesystems keyed by server identifier
pub struct ServerRegistry {
    data_directory: PathBuf,
    permits: Arc<Semaphore>,
    policy: UnreadablePolicy,
    runtime: watch::Receiver<RuntimeConfig>,
    servers: RwLock<HashMap<String, Arc<Filesystem>>>,
}

impl ServerRegistry {
    pub fn new(startup: &StartupConfig, runtime: watch::Receiver<RuntimeConfig>) -> Self {
        Self {
            data_directory: startup.data_path(),
            permits: Arc::new(Semaphore::new(startup.walk_concurrency.max(1))),
            policy: startup.unreadable_directories,
            runtime,
            servers: RwLock::new(HashMap::new()),
        }
    }

    pub fn data_directory(&self) -> &Path {
        &self.data_directory
    }

    /// Returns the filesystem for `server_id`, creating it on first use.
    ///
    /// An existing entry keeps its cached usage; only its disk limit is updated.
    pub async fn create(&self, server_id: &str, disk_limit: i64) -> Result<Arc<Filesystem>, FsError> {
        let mut servers = self.servers.write().await;

        if let Some(existing) = servers.get(server_id) {
            existing.quota().set_disk_limit(disk_limit);
            return Ok(Arc::clone(existing));
        }

        let filesystem = Arc::new(Filesystem::new(
            &self.data_directory,
            server_id,
            disk_limit,
            DirectoryWalker::with_permits(Arc::clone(&self.permits), self.policy),
            Arc::new(MemoryCache::new()),
            self.runtime.clone(),
        )?);

        servers.insert(server_id.to_string(), Arc::clone(&filesystem));
        info!(
            "Registered server {} at {} ({} servers)",
            server_id,
            filesystem.path().display(),
            servers.len()
        );

        Ok(filesystem)
    }

    pub async fn get(&self, server_id: &str) -> Option<Arc<Filesystem>> {
        self.servers.read().await.get(server_id).cloned()
    }

    pub async fn remove(&self, server_id: &str) -> Option<Arc<Filesystem>> {
        let removed = self.servers.write().await.remove(server_id);
        if removed.is_some() {
            info!("Removed server {}", server_id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.servers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.servers.read().await.is_empty()
    }
}
