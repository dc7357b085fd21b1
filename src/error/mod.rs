//! Error handling
//!
//! Defines error types for the confinement and quota layer.

pub mod types;

pub use types::*;
