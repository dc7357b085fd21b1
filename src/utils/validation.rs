//! Input validation utilities
//!
//! Provides validation for identifiers that end up as path segments.

use std::path::{Component, Path};

/// Maximum length of a server identifier, matching common filesystem name limits.
pub const MAX_SERVER_ID_LENGTH: usize = 255;

/// Validate that a server identifier is exactly one normal path segment
pub fn is_valid_server_id(id: &str) -> bool {
    if id.is_empty()
        || id.len() > MAX_SERVER_ID_LENGTH
        || id.contains('\0')
        || id.contains('/')
        || id.contains('\\')
    {
        return false;
    }

    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
