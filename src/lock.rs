//! Advisory, path-scoped locks around baseline read-modify-write sequences.
//!
//! Each lock file holds a token unique to its holder. Only the holder whose
//! token is still in the file removes it, and a stale lock is broken by
//! renaming it aside first, so two waiters never both break the same lock.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Default time spent retrying a held lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// A lock file older than this is assumed to belong to a crashed process.
const STALE_AFTER: Duration = Duration::from_secs(600);

/// Per-process counter mixed into holder tokens.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Exclusive hold on a baseline path. The sibling `<file>.lock` is removed
/// when the guard drops, on every exit path, unless another holder has
/// since broken and re-taken it.
#[derive(Debug)]
pub struct BaselineLock {
    /// The lock file this guard created.
    path: PathBuf,
    /// Baseline the lock guards.
    target: PathBuf,
    /// Holder token written into the lock file.
    token: String,
}

impl BaselineLock {
    /// Acquire the lock for `target`, retrying until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConcurrencyError` if another holder keeps the lock for
    /// the whole timeout, or `Error::Io` if the lock file cannot be created
    /// or its token cannot be written.
    pub fn acquire(target: &Path, timeout: Duration) -> Result<Self> {
        let path = lock_path_for(target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let token = holder_token();

        let started = Instant::now();
        let mut contended = false;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(token.as_bytes()).and_then(|()| return file.sync_all()) {
                        tracing::debug!(lock = %display_name(&path), error = %e, "could not record lock holder");
                        drop(file);
                        if let Err(cleanup) = std::fs::remove_file(&path) {
                            tracing::debug!(lock = %display_name(&path), error = %cleanup, "could not remove unowned lock");
                        }
                        return Err(Error::Io(e));
                    }
                    if contended {
                        tracing::debug!(waited_ms = started.elapsed().as_millis(), "acquired contended baseline lock");
                    }
                    return Ok(Self { path, target: target.to_path_buf(), token });
                },
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {},
                Err(e) => return Err(Error::Io(e)),
            }

            contended = true;
            if break_if_stale(&path, &token) {
                continue;
            }
            if started.elapsed() >= timeout {
                return Err(Error::ConcurrencyError { file: display_name(&path), waited: timeout });
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Whether the lock file still carries this holder's token.
    pub fn is_held(&self) -> bool {
        return std::fs::read_to_string(&self.path).is_ok_and(|content| return content == self.token);
    }

    /// The baseline this lock guards.
    pub fn target(&self) -> &Path {
        return &self.target;
    }
}

impl Drop for BaselineLock {
    fn drop(&mut self) {
        if !self.is_held() {
            tracing::warn!(lock = %display_name(&self.path), "baseline lock was broken by another holder; leaving it");
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(lock = %display_name(&self.path), error = %e, "failed to release baseline lock");
        }
    }
}

/// Sibling lock file for a baseline: `repo-baseline.json` → `repo-baseline.json.lock`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".lock");
    return target.with_file_name(name);
}

/// Remove a lock left behind by a dead process. Returns whether it was removed.
///
/// The lock is renamed to a name only this waiter uses before it is deleted.
/// If the renamed file is not the one judged stale, a fresh holder took the
/// lock in between and it is linked back into place.
fn break_if_stale(path: &Path, token: &str) -> bool {
    let Ok(modified) = std::fs::metadata(path).and_then(|m| return m.modified()) else {
        return false;
    };
    let age = SystemTime::now().duration_since(modified).unwrap_or_default();
    if age < STALE_AFTER {
        return false;
    }
    let Ok(observed) = std::fs::read_to_string(path) else {
        return false;
    };

    let mut grave_name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    grave_name.push(format!(".stale-{token}"));
    let grave = path.with_file_name(grave_name);
    if std::fs::rename(path, &grave).is_err() {
        return false;
    }

    let moved = std::fs::read_to_string(&grave).unwrap_or_default();
    let broken = moved == observed;
    if broken {
        tracing::warn!(lock = %display_name(path), age_secs = age.as_secs(), "broke stale baseline lock");
    } else if let Err(e) = std::fs::hard_link(&grave, path) {
        tracing::warn!(lock = %display_name(path), error = %e, "could not restore a freshly taken lock");
    }
    if let Err(e) = std::fs::remove_file(&grave) {
        tracing::debug!(lock = %display_name(&grave), error = %e, "could not remove broken lock");
    }
    return broken;
}

/// File name only, so absolute paths never reach error messages.
fn display_name(path: &Path) -> String {
    return path.file_name().map(|n| return n.to_string_lossy().into_owned()).unwrap_or_default();
}

/// `<pid>-<nanos>-<counter>`, unique across processes and threads.
fn holder_token() -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let counter = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    return format!("{}-{nanos}-{counter}", std::process::id());
}
