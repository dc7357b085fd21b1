//! Directory size computation
//!
//! Walks a confined subtree with one task per subdirectory. Every task
//! returns its own subtotal and the parent sums them once all children have
//! joined, so no accumulator is shared while tasks run. A semaphore bounds
//! how many directories are being listed at the same time.

use log::debug;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::UnreadablePolicy;
use crate::error::FsError;
use crate::filesystem::resolver;

type WalkFuture = Pin<Box<dyn Future<Output = Result<u64, FsError>> + Send>>;

/// Computes the byte size of directory trees inside a confined root.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    permits: Arc<Semaphore>,
    policy: UnreadablePolicy,
}

struct WalkContext {
    root: PathBuf,
    permits: Arc<Semaphore>,
    policy: UnreadablePolicy,
}

/// What a single directory listing produced.
struct Listing {
    files: u64,
    subdirs: Vec<PathBuf>,
}

impl DirectoryWalker {
    /// Creates a walker allowed `max_concurrency` simultaneous directory listings.
    pub fn new(max_concurrency: usize, policy: UnreadablePolicy) -> Self {
        Self::with_permits(Arc::new(Semaphore::new(max_concurrency.max(1))), policy)
    }

    /// Creates a walker drawing from a shared listing budget.
    pub fn with_permits(permits: Arc<Semaphore>, policy: UnreadablePolicy) -> Self {
        Self { permits, policy }
    }

    /// Returns the total size in bytes of everything below `relative_dir`.
    ///
    /// Only a failure on `relative_dir` itself is returned as an error. Under
    /// [`UnreadablePolicy::Skip`] a nested directory that cannot be listed
    /// counts as zero bytes.
    pub async fn size(&self, root: &Path, relative_dir: &str) -> Result<u64, FsError> {
        let ctx = Arc::new(WalkContext {
            root: root.to_path_buf(),
            permits: Arc::clone(&self.permits),
            policy: self.policy,
        });

        walk(ctx, PathBuf::from(relative_dir.trim_start_matches('/'))).await
    }
}

fn walk(ctx: Arc<WalkContext>, relative: PathBuf) -> WalkFuture {
    Box::pin(async move {
        let listing = {
            // Held only while listing, never while waiting on children.
            let _permit = ctx
                .permits
                .acquire()
                .await
                .map_err(|e| FsError::Io(io::Error::other(e)))?;

            let root = ctx.root.clone();
            let target = relative.clone();
            tokio::task::spawn_blocking(move || list(&root, &target))
                .await
                .map_err(|e| FsError::Io(io::Error::other(e)))??
        };

        let mut children = JoinSet::new();
        for subdir in listing.subdirs {
            children.spawn(walk(Arc::clone(&ctx), subdir));
        }

        let mut subtotals = Vec::with_capacity(children.len());
        while let Some(joined) = children.join_next().await {
            let outcome = joined.map_err(|e| FsError::Io(io::Error::other(e)));
            match (outcome.and_then(|r| r), ctx.policy) {
                (Ok(size), _) => subtotals.push(size),
                (Err(e), UnreadablePolicy::Fail) => return Err(e),
                (Err(e), UnreadablePolicy::Skip) => {
                    debug!(
                        "skipping unreadable directory below {}/{}: {}",
                        ctx.root.display(),
                        relative.display(),
                        e
                    );
                }
            }
        }

        Ok::<u64, FsError>(listing.files + subtotals.iter().sum::<u64>())
    })
}

/// Lists one directory, summing its non-directory entries.
///
/// Entries are not followed through symlinks; a link counts as its own
/// length. Entries that vanish between listing and stat count as zero.
fn list(root: &Path, relative: &Path) -> Result<Listing, FsError> {
    let resolved = resolver::resolve(root, relative)?;

    let mut listing = Listing {
        files: 0,
        subdirs: Vec::new(),
    };

    for entry in std::fs::read_dir(&resolved)? {
        let entry = entry?;
        let Ok(metadata) = entry.metadata() else {
            continue;
        };

        if metadata.is_dir() {
            listing.subdirs.push(relative.join(entry.file_name()));
        } else {
            listing.files += metadata.len();
        }
    }

    Ok(listing)
}
