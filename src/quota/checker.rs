//! Disk quota checks
//!
//! Answers whether a server is still within its disk allowance. Computing
//! usage means walking the whole server directory, so the figure is cached
//! for the configured disk check interval and concurrent misses share one
//! walk.

use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::watch;

use crate::config::RuntimeConfig;
use crate::error::FsError;
use crate::quota::cache::KeyValueCache;
use crate::quota::inflight::InFlight;

/// Cache key holding the last computed usage in bytes.
pub const DISK_USED_KEY: &str = "disk_used";

/// Bytes per mebibyte.
pub const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Cached disk usage and quota for one server.
pub struct QuotaCache {
    server_id: String,
    /// Allowance in MiB; zero or negative means unlimited.
    disk_limit: AtomicI64,
    cache: Arc<dyn KeyValueCache>,
    inflight: InFlight<Option<u64>>,
    runtime: watch::Receiver<RuntimeConfig>,
}

impl QuotaCache {
    pub fn new(
        server_id: &str,
        disk_limit: i64,
        cache: Arc<dyn KeyValueCache>,
        runtime: watch::Receiver<RuntimeConfig>,
    ) -> Self {
        Self {
            server_id: server_id.to_string(),
            disk_limit: AtomicI64::new(disk_limit),
            cache,
            inflight: InFlight::new(),
            runtime,
        }
    }

    /// Current allowance in MiB.
    pub fn disk_limit(&self) -> i64 {
        self.disk_limit.load(Ordering::Relaxed)
    }

    /// Replaces the allowance, e.g. after the server's build settings change.
    pub fn set_disk_limit(&self, limit: i64) {
        self.disk_limit.store(limit, Ordering::Relaxed);
    }

    /// Last computed usage in bytes, if still fresh.
    pub fn cached_usage(&self) -> Option<u64> {
        self.cache.get(DISK_USED_KEY)
    }

    /// Returns true if current usage fits within the allowance.
    ///
    /// `compute` is only called when no fresh usage figure is cached. Errors
    /// from it are logged and treated as zero usage, so this never blocks the
    /// caller on a failed computation.
    pub async fn has_space_available<F, Fut>(&self, compute: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, FsError>>,
    {
        let limit = self.disk_limit();
        if limit <= 0 {
            return true;
        }

        let used = self.usage(compute).await;
        self.fits(used)
    }

    /// Returns true if `used_bytes` is within the allowance, in whole MiB.
    pub fn fits(&self, used_bytes: u64) -> bool {
        let limit = self.disk_limit();
        limit <= 0 || used_bytes / BYTES_PER_MIB <= limit as u64
    }

    /// Returns usage in bytes from the cache, computing it on a miss.
    pub async fn usage<F, Fut>(&self, compute: F) -> u64
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, FsError>>,
    {
        let runtime = self.runtime.borrow().clone();
        if !runtime.disk_checking_enabled() {
            return 0;
        }

        if let Some(used) = self.cache.get(DISK_USED_KEY) {
            return used;
        }

        let ttl = runtime.disk_check_interval();
        let computed = self
            .inflight
            .run(DISK_USED_KEY, || async {
                // Another caller may have stored a figure while this one waited.
                if let Some(used) = self.cache.get(DISK_USED_KEY) {
                    return Some(used);
                }

                match compute().await {
                    Ok(size) => {
                        debug!("server {} is using {} bytes", self.server_id, size);
                        self.cache.set(DISK_USED_KEY, size, ttl);
                        Some(size)
                    }
                    Err(e) => {
                        warn!(
                            "failed to determine directory size for server {}: {}",
                            self.server_id, e
                        );
                        None
                    }
                }
            })
            .await;

        computed.unwrap_or(0)
    }
}
