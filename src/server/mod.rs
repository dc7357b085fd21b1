//! Server bookkeeping
//!
//! Holds the registry mapping server identifiers to their confined filesystems.

pub mod registry;

pub use registry::ServerRegistry;
