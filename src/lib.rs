//! Filesystem confinement and disk quotas for managed servers.
//!
//! Every server owns a directory below a shared data directory. Paths from
//! any external surface are resolved through [`filesystem::resolve`] so they
//! can never leave that directory, and [`Filesystem::has_space_available`]
//! answers quota checks from a cached, concurrently computed usage figure.

pub mod config;
pub mod error;
pub mod filesystem;
pub mod quota;
pub mod server;
pub mod utils;

pub use error::FsError;
pub use filesystem::Filesystem;
pub use server::ServerRegistry;
