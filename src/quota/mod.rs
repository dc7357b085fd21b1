//! Disk quota management
//!
//! Caches per-server disk usage and answers quota checks against it.

pub mod cache;
pub mod checker;
pub mod inflight;

pub use cache::{KeyValueCache, MemoryCache};
pub use checker::{BYTES_PER_MIB, DISK_USED_KEY, QuotaCache};
pub use inflight::InFlight;
