//! Atomic baseline persistence with first-seen timestamp preservation.
//!
//! Every save is: lock → read prior `createdAt` → write temp file in the
//! target's directory → fsync → rename over the target → unlock. Callers that
//! replace several documents together stage each under its lock and commit
//! only once every one of them is staged. Readers never
//! take the lock; the rename guarantees they see the old or the new document.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::lock::BaselineLock;

/// A baseline document that records when it was first created.
pub trait Provenance {
    /// Set `createdAt` (kept from a previous save when one exists) and the
    /// per-save timestamp.
    fn stamp(&mut self, created_at: Option<String>, now: &str);
}

/// A fully written temporary file waiting to replace its target.
///
/// Dropping it without `commit` deletes the temporary and leaves the
/// target untouched.
#[derive(Debug)]
pub struct StagedWrite {
    /// Destination of the rename.
    target: PathBuf,
    /// Flushed temporary in the same directory as `target`.
    temp: NamedTempFile,
}

impl StagedWrite {
    /// Atomically replace the target with the staged content.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the rename fails.
    pub fn commit(self) -> Result<()> {
        self.temp.persist(&self.target).map_err(|e| return Error::Io(e.error))?;
        return Ok(());
    }
}

/// Current time in the RFC 3339 form stored in baselines.
pub fn now_rfc3339() -> String {
    return chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
}

/// Read a baseline document. Absent and corrupt files both come back as
/// `None`; corruption is logged so the caller can re-initialize.
///
/// # Errors
///
/// Returns `Error::Io` only for read failures other than not-found.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
        Ok(c) => c,
    };
    return match serde_json::from_str(&content) {
        Err(e) => {
            tracing::warn!(file = %file_name(path), error = %e, "baseline is corrupt; treating as absent");
            Ok(None)
        },
        Ok(value) => Ok(Some(value)),
    };
}

/// `createdAt` of an existing document, tolerating any other corruption.
pub fn read_created_at(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    return value.get("createdAt")?.as_str().map(String::from);
}

/// Lock, stamp, and atomically write `document` to `path`.
///
/// # Errors
///
/// Returns `Error::ConcurrencyError` if the lock is unavailable,
/// `Error::SerializationError` if the document cannot be encoded,
/// or `Error::Io` on write failures.
pub fn save_json<T: Serialize + Provenance>(path: &Path, document: &mut T, lock_timeout: Duration) -> Result<()> {
    let lock = BaselineLock::acquire(path, lock_timeout)?;
    stage_json(&lock, document)?.commit()?;
    return Ok(());
}

/// Write `bytes` to a flushed temporary next to `target`.
///
/// # Errors
///
/// Returns `Error::Io` if the directory or temporary cannot be written.
pub fn stage(target: &Path, bytes: &[u8]) -> Result<StagedWrite> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut temp = NamedTempFile::new_in(&dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;

    return Ok(StagedWrite { target: target.to_path_buf(), temp });
}

/// Stamp `document` against the prior `createdAt` of the locked target and
/// stage it for replacement. The caller commits while still holding `lock`.
///
/// # Errors
///
/// Returns `Error::SerializationError` if the document cannot be encoded,
/// or `Error::Io` if the temporary cannot be written.
pub fn stage_json<T: Serialize + Provenance>(lock: &BaselineLock, document: &mut T) -> Result<StagedWrite> {
    let path = lock.target();
    let prior = read_created_at(path);
    document.stamp(prior, &now_rfc3339());

    let mut bytes = serde_json::to_vec_pretty(document).map_err(|e| return Error::SerializationError {
        file: file_name(path),
        reason: e.to_string(),
    })?;
    bytes.push(b'\n');

    let staged = stage(path, &bytes)?;
    tracing::debug!(file = %file_name(path), bytes = bytes.len(), "baseline staged");
    return Ok(staged);
}

/// File name only, for log fields and error messages.
fn file_name(path: &Path) -> String {
    return path.file_name().map(|n| return n.to_string_lossy().into_owned()).unwrap_or_default();
}
