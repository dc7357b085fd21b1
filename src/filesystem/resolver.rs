//! Path resolution
//!
//! Turns caller-supplied relative paths into absolute paths proven to lie
//! inside a server's confined root. Containment is always checked with
//! [`Path::starts_with`], which compares whole components, so a sibling
//! directory such as `srv-10` is never mistaken for a child of `srv-1`.
//!
//! The check holds at the instant of the call only; nothing stops another
//! process from swapping a directory for a symlink afterwards.

use log::debug;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::FsError;

/// Maximum number of symlinks followed while validating a missing path.
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Resolves `relative` against `root` and proves the result stays inside it.
///
/// `root` must already be a real path (no symlinked components). Leading
/// separators on `relative` are ignored, so `/a/b` and `a/b` are equivalent.
///
/// If the target exists its symlink-free real path is returned. If it does
/// not exist, the lexically normalized candidate is returned once the deepest
/// component that exists, reached by following every symlink on the way, has
/// been shown to lie inside `root`.
pub fn resolve(root: &Path, relative: impl AsRef<Path>) -> Result<PathBuf, FsError> {
    let relative = relative.as_ref();
    let candidate = normalize(&root.join(relative.strip_prefix("/").unwrap_or(relative)));

    resolve_candidate(root, candidate).inspect_err(|e| {
        if e.is_path_escape() {
            debug!(
                "rejected path {} for root {}: {}",
                relative.display(),
                root.display(),
                e
            );
        }
    })
}

/// Lexically normalizes a path, collapsing `.`, `..` and repeated separators.
///
/// `..` never climbs above the filesystem root; on relative paths leading
/// `..` components are preserved.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(name) => out.push(name),
        }
    }

    out
}

/// Returns true if `path` equals `root` or lies beneath it, component-wise.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

fn resolve_candidate(root: &Path, candidate: PathBuf) -> Result<PathBuf, FsError> {
    if !is_within(&candidate, root) {
        return Err(escape(&candidate));
    }

    match fs::canonicalize(&candidate) {
        Ok(real) if is_within(&real, root) => Ok(real),
        Ok(_) => Err(escape(&candidate)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let existing = deepest_existing(&candidate)?;
            if is_within(&existing, root) {
                Ok(candidate)
            } else {
                Err(escape(&candidate))
            }
        }
        Err(e) => Err(FsError::Io(e)),
    }
}

/// Follows `path` the way the kernel would when creating it and returns the
/// real path of the deepest component that exists.
///
/// Symlinks, dangling ones included, are followed as they are met and `..`
/// applies to the real directory reached so far. A `..` after the first
/// missing component can never be created, so it is rejected.
fn deepest_existing(path: &Path) -> Result<PathBuf, FsError> {
    let mut pending: VecDeque<OsString> = path
        .components()
        .map(|c| c.as_os_str().to_os_string())
        .collect();
    let mut real = PathBuf::new();
    let mut hops = 0;

    while let Some(part) = pending.pop_front() {
        match Path::new(&part).components().next() {
            Some(Component::RootDir) | Some(Component::Prefix(_)) => real = PathBuf::from(&part),
            Some(Component::CurDir) | None => {}
            Some(Component::ParentDir) => {
                real.pop();
            }
            Some(Component::Normal(name)) => {
                let next = real.join(name);
                match fs::symlink_metadata(&next) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(FsError::Io(io::Error::other(
                                "too many levels of symbolic links",
                            )));
                        }
                        let target = fs::read_link(&next)?;
                        for c in target.components().rev() {
                            pending.push_front(c.as_os_str().to_os_string());
                        }
                    }
                    Ok(_) => real = next,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        let climbs = pending
                            .iter()
                            .any(|p| Path::new(p).components().next() == Some(Component::ParentDir));
                        if climbs {
                            return Err(escape(path));
                        }
                        return Ok(real);
                    }
                    Err(e) => return Err(FsError::Io(e)),
                }
            }
        }
    }

    Ok(real)
}

fn escape(path: &Path) -> FsError {
    FsError::PathEscape(path.display().to_string())
}
