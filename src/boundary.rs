//! Path safety gate: proves a path stays inside the project root.
//!
//! Symlinks are resolved one hop at a time instead of via `canonicalize`, so a
//! chain that leaves the root and comes back is still caught at the hop that
//! escaped, and cyclic chains stop at the configured depth.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Default maximum number of symlink hops followed while resolving one path.
pub const DEFAULT_MAX_SYMLINK_DEPTH: usize = 40;

/// A canonical project root plus the symlink depth budget for validation.
#[derive(Debug, Clone)]
pub struct Boundary {
    /// Maximum symlink hops per validated path.
    max_depth: usize,
    /// Canonical absolute root.
    root: PathBuf,
}

impl Boundary {
    /// Canonicalize `root` and build a gate around it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the root does not exist or cannot be resolved.
    pub fn new(root: &Path, max_depth: usize) -> Result<Self> {
        let root = root.canonicalize()?;
        return Ok(Self { max_depth, root });
    }

    /// Replace an absolute path by something safe to show: root-relative when
    /// inside, otherwise only the final component.
    pub fn redact(&self, path: &Path) -> String {
        if let Ok(relative) = path.strip_prefix(&self.root) {
            return to_forward_slashes(relative);
        }
        if path.is_relative() {
            return to_forward_slashes(path);
        }
        let name = path.file_name().map(|n| return n.to_string_lossy().into_owned()).unwrap_or_default();
        return format!("<outside>/{name}");
    }

    /// Project-relative, forward-slash form of a path already inside the root.
    pub fn relative(&self, path: &Path) -> Option<String> {
        return path.strip_prefix(&self.root).ok().map(to_forward_slashes);
    }

    /// The canonical root.
    pub fn root(&self) -> &Path {
        return &self.root;
    }

    /// Resolve `path` (absolute, or relative to the root) to its canonical
    /// form and prove every symlink hop and the final location stay inside
    /// the root. Components that do not exist yet are appended lexically.
    ///
    /// # Errors
    ///
    /// Returns `Error::BoundaryViolation` if any hop or the final location
    /// leaves the root, `Error::RecursionLimitExceeded` if more than
    /// `max_depth` symlinks are followed, or `Error::Io` on unexpected
    /// metadata failures.
    pub fn validate(&self, path: &Path) -> Result<PathBuf> {
        let absolute = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };

        let mut pending: VecDeque<OsString> = VecDeque::new();
        let mut resolved = PathBuf::new();
        queue_components(&absolute, &mut resolved, &mut pending);

        let mut hops = 0_usize;
        let mut missing = false;

        while let Some(component) = pending.pop_front() {
            if component == ".." {
                resolved.pop();
                continue;
            }
            resolved.push(&component);
            if missing {
                continue;
            }

            let metadata = match std::fs::symlink_metadata(&resolved) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    missing = true;
                    continue;
                },
                Err(e) => return Err(Error::Io(e)),
                Ok(m) => m,
            };
            if !metadata.file_type().is_symlink() {
                continue;
            }

            hops = hops.saturating_add(1);
            if hops > self.max_depth {
                return Err(Error::RecursionLimitExceeded {
                    max_depth: self.max_depth,
                    path: self.redact(&absolute),
                });
            }

            // Links above the root (e.g. `/var` -> `/private/var`) are how the
            // root itself is reached; only links inside it are constrained.
            let link_inside = resolved.starts_with(&self.root);
            let target = std::fs::read_link(&resolved)?;
            resolved.pop();
            let hop = lexical_normalize(&resolved.join(&target));
            if link_inside && !hop.starts_with(&self.root) {
                tracing::debug!(path = %self.redact(&absolute), "symlink hop leaves project root");
                return Err(Error::BoundaryViolation { path: self.redact(&absolute) });
            }

            // Re-walk the link target ahead of whatever was still pending.
            let mut rest: VecDeque<OsString> = VecDeque::new();
            queue_components(&target, &mut resolved, &mut rest);
            rest.extend(pending.drain(..));
            pending = rest;
        }

        if !resolved.starts_with(&self.root) {
            return Err(Error::BoundaryViolation { path: self.redact(&absolute) });
        }
        return Ok(resolved);
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            other => out.push(other.as_os_str()),
        }
    }
    return out;
}

/// Split `path` into pending components. An absolute path resets `resolved`
/// to its anchor (root or drive); a relative one is queued on top of it.
fn queue_components(path: &Path, resolved: &mut PathBuf, pending: &mut VecDeque<OsString>) {
    if path.has_root()
        && let Some(anchor) = path.ancestors().last()
    {
        *resolved = anchor.to_path_buf();
    }
    for component in path.components() {
        match component {
            Component::ParentDir => pending.push_back(OsString::from("..")),
            Component::Normal(name) => pending.push_back(name.to_os_string()),
            Component::CurDir | Component::Prefix(_) | Component::RootDir => {},
        }
    }
}

/// Render a relative path with `/` separators on every platform.
fn to_forward_slashes(path: &Path) -> String {
    return path
        .components()
        .map(|c| return c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
}
