//! Error types
//!
//! Defines the error taxonomy shared by path resolution, directory walks and
//! filesystem construction.

use std::fmt;
use std::io;

/// Filesystem confinement errors
#[derive(Debug)]
pub enum FsError {
    /// The requested path resolves outside of the server's confined root.
    PathEscape(String),
    /// The server identifier cannot be used as a single path segment.
    InvalidServerId(String),
    /// Underlying stat/readlink/readdir failure unrelated to an escape attempt.
    Io(io::Error),
}

impl FsError {
    /// Returns true if this error is a confinement violation.
    pub fn is_path_escape(&self) -> bool {
        matches!(self, FsError::PathEscape(_))
    }

    /// Returns true if the underlying I/O error is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::PathEscape(p) => write!(f, "Invalid path resolution: {}", p),
            FsError::InvalidServerId(id) => write!(f, "Invalid server identifier: {:?}", id),
            FsError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(error: io::Error) -> Self {
        FsError::Io(error)
    }
}
