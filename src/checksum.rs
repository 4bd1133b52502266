//! Content-fingerprint baselines: hashing, repository metadata, persistence.

use std::collections::BTreeMap;
use std::io::Read as _;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::boundary::Boundary;
use crate::error::Result;
use crate::exclude::ExcludeRules;
use crate::governor::Deadline;
use crate::lock::BaselineLock;
use crate::persist::{self, Provenance, StagedWrite};
use crate::types::TrackedFile;
use crate::vcs::{self, VcsMetadata};
use crate::walker::Enumerator;

/// Schema version written into new checksum baselines.
pub const SCHEMA_VERSION: &str = "1.0";

/// Read buffer size for streamed hashing.
const CHUNK_SIZE: usize = 64 * 1024;

/// Directories checked, in order, when looking for project documentation.
const DOCS_DIRS: &[&str] = &["docs", "doc", "documentation"];

/// README names checked, in order, for the project description.
const README_NAMES: &[&str] = &["README.md", "README.rst", "README.txt", "README", "readme.md"];

/// Longest description kept from the README.
const MAX_DESCRIPTION_CHARS: usize = 200;

/// A snapshot of per-file content hashes plus repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumBaseline {
    /// First time a baseline was written at this location.
    #[serde(default)]
    pub created_at: String,
    /// First prose line of the README.
    #[serde(default)]
    pub description: String,
    /// Dominant source language by file count.
    #[serde(default)]
    pub detected_language: String,
    /// Whether a documentation directory exists.
    #[serde(default)]
    pub docs_exist: bool,
    /// Root-relative documentation directory, when one exists.
    #[serde(default)]
    pub docs_path: Option<String>,
    /// Number of entries in `files`.
    pub file_count: usize,
    /// Relative path → lowercase hex SHA-256 (empty when unreadable).
    pub files: BTreeMap<String, String>,
    /// Name of the project root directory.
    #[serde(default)]
    pub repo_name: String,
    /// Document format version.
    pub schema_version: String,
    /// When this snapshot was saved.
    #[serde(default)]
    pub timestamp: String,
    /// Commit and branch at snapshot time.
    #[serde(default)]
    pub vcs_metadata: Option<VcsMetadata>,
}

impl ChecksumBaseline {
    /// Drop entries the current rules exclude, so newly excluded paths fall
    /// out of tracking instead of showing up as deletions.
    pub fn retain_tracked(&mut self, rules: &ExcludeRules) {
        self.files.retain(|file, _| return !rules.is_excluded(file));
        self.file_count = self.files.len();
    }
}

impl Provenance for ChecksumBaseline {
    fn stamp(&mut self, created_at: Option<String>, now: &str) {
        self.created_at = created_at
            .or_else(|| return Some(self.created_at.clone()).filter(|c| return !c.is_empty()))
            .unwrap_or_else(|| return now.to_string());
        self.timestamp = now.to_string();
    }
}

/// Walk the tree and fingerprint every tracked file.
///
/// # Errors
///
/// Returns `Error::ResourceLimitExceeded` past the ceiling or
/// `Error::TimeoutExceeded` when the deadline expires. Unreadable files do
/// not fail the snapshot.
pub fn compute_snapshot(
    boundary: &Boundary,
    rules: &ExcludeRules,
    ceiling: usize,
    deadline: &Deadline,
) -> Result<ChecksumBaseline> {
    let mut files = BTreeMap::new();
    let mut extensions: BTreeMap<String, usize> = BTreeMap::new();

    for tracked in Enumerator::new(boundary, rules, ceiling, deadline) {
        let TrackedFile { absolute, relative } = tracked?;
        if let Some(ext) = Path::new(&relative).extension().and_then(|e| return e.to_str()) {
            let count = extensions.entry(ext.to_ascii_lowercase()).or_default();
            *count = count.saturating_add(1);
        }
        files.insert(relative, hash_file(&absolute));
    }

    let root = boundary.root();
    let docs_path = find_docs_dir(boundary);
    let baseline = ChecksumBaseline {
        created_at: String::new(),
        description: read_description(boundary),
        detected_language: detect_language(&extensions).to_string(),
        docs_exist: docs_path.is_some(),
        docs_path,
        file_count: files.len(),
        files,
        repo_name: root.file_name().map(|n| return n.to_string_lossy().into_owned()).unwrap_or_default(),
        schema_version: SCHEMA_VERSION.to_string(),
        timestamp: String::new(),
        vcs_metadata: vcs::metadata(root, deadline),
    };
    tracing::debug!(files = baseline.file_count, language = %baseline.detected_language, "checksum snapshot computed");
    return Ok(baseline);
}

/// Streamed SHA-256 of a file's content. Unreadable files hash to the empty
/// string so one bad file never aborts a snapshot.
pub fn hash_file(path: &Path) -> String {
    let mut file = match std::fs::File::open(path) {
        Err(e) => {
            tracing::debug!(error = %e, "unreadable file recorded with empty hash");
            return String::new();
        },
        Ok(f) => f,
    };

    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    loop {
        match file.read(&mut buffer) {
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
            Err(e) => {
                tracing::debug!(error = %e, "read failed mid-file; recording empty hash");
                return String::new();
            },
            Ok(0) => break,
            Ok(n) => hasher.update(buffer.get(..n).unwrap_or_default()),
        }
    }
    return format!("{:x}", hasher.finalize());
}

/// Load a checksum baseline; absent or corrupt → `None`.
///
/// # Errors
///
/// Returns `Error::Io` for read failures other than not-found.
pub fn load(path: &Path) -> Result<Option<ChecksumBaseline>> {
    return persist::load_json(path);
}

/// Atomically save a checksum baseline under its lock, preserving `createdAt`.
///
/// # Errors
///
/// Returns `Error::ConcurrencyError`, `Error::SerializationError`, or `Error::Io`.
pub fn save(path: &Path, baseline: &mut ChecksumBaseline, lock_timeout: Duration) -> Result<()> {
    let lock = BaselineLock::acquire(path, lock_timeout)?;
    return stage(&lock, baseline)?.commit();
}

/// Stamp and stage a checksum baseline for the locked target.
///
/// # Errors
///
/// Returns `Error::SerializationError` or `Error::Io`.
pub fn stage(lock: &BaselineLock, baseline: &mut ChecksumBaseline) -> Result<StagedWrite> {
    baseline.file_count = baseline.files.len();
    return persist::stage_json(lock, baseline);
}

/// Language name for the most common recognized extension; ties go to the
/// alphabetically first language.
fn detect_language(extensions: &BTreeMap<String, usize>) -> &'static str {
    let mut totals: BTreeMap<&'static str, usize> = BTreeMap::new();
    for (ext, count) in extensions {
        if let Some(language) = language_for_extension(ext) {
            let total = totals.entry(language).or_default();
            *total = total.saturating_add(*count);
        }
    }
    let mut best: Option<(&'static str, usize)> = None;
    for (language, count) in totals {
        if best.is_none_or(|(_, top)| return count > top) {
            best = Some((language, count));
        }
    }
    return best.map_or("unknown", |(language, _)| return language);
}

/// First documentation directory present inside the root.
fn find_docs_dir(boundary: &Boundary) -> Option<String> {
    return DOCS_DIRS
        .iter()
        .find(|dir| {
            return boundary.validate(Path::new(dir)).is_ok_and(|p| return p.is_dir());
        })
        .map(|dir| return (*dir).to_string());
}

/// Map a file extension to a display language name.
fn language_for_extension(ext: &str) -> Option<&'static str> {
    return match ext {
        "c" | "h" => Some("c"),
        "cc" | "cpp" | "cxx" | "hpp" => Some("cpp"),
        "cs" => Some("csharp"),
        "go" => Some("go"),
        "java" => Some("java"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        "kt" | "kts" => Some("kotlin"),
        "php" => Some("php"),
        "py" | "pyi" => Some("python"),
        "rb" => Some("ruby"),
        "rs" => Some("rust"),
        "sh" | "bash" => Some("shell"),
        "swift" => Some("swift"),
        "ts" | "tsx" => Some("typescript"),
        _ => None,
    };
}

/// First prose line of the README, skipping headings, badges, and markup.
fn read_description(boundary: &Boundary) -> String {
    for name in README_NAMES {
        let Ok(path) = boundary.validate(Path::new(name)) else {
            continue;
        };
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let line = content
            .lines()
            .map(str::trim)
            .find(|l| {
                return !l.is_empty()
                    && !l.starts_with('#')
                    && !l.starts_with("[!")
                    && !l.starts_with('<')
                    && !l.starts_with("---")
                    && !l.starts_with("===")
                    && !l.starts_with("```");
            })
            .unwrap_or("");
        return line.chars().take(MAX_DESCRIPTION_CHARS).collect();
    }
    return String::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::DEFAULT_MAX_SYMLINK_DEPTH;

    fn snapshot(dir: &tempfile::TempDir) -> ChecksumBaseline {
        let boundary = Boundary::new(dir.path(), DEFAULT_MAX_SYMLINK_DEPTH).unwrap();
        let deadline = Deadline::unbounded("test");
        return compute_snapshot(&boundary, &ExcludeRules::defaults(), 100, &deadline).unwrap();
    }

    #[test]
    fn hashes_are_sha256_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(hash_file(&path), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn missing_file_hashes_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(hash_file(&dir.path().join("gone.txt")), "");
    }

    #[test]
    fn snapshot_collects_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# Tool\n\n[![ci](x)](y)\nDoes useful things.\n").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/guide.md"), "guide").unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1").unwrap();
        std::fs::write(dir.path().join("b.py"), "y = 2").unwrap();
        std::fs::write(dir.path().join("c.rs"), "fn main() {}").unwrap();

        let baseline = snapshot(&dir);
        assert_eq!(baseline.file_count, 5);
        assert_eq!(baseline.detected_language, "python");
        assert_eq!(baseline.description, "Does useful things.");
        assert!(baseline.docs_exist);
        assert_eq!(baseline.docs_path.as_deref(), Some("docs"));
        assert_eq!(baseline.schema_version, SCHEMA_VERSION);
        assert!(baseline.files.contains_key("docs/guide.md"));
    }

    #[test]
    fn save_then_load_preserves_files_and_created_at() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), "one").unwrap();
        let target = dir.path().join(".driftline/memory/repo-baseline.json");

        let mut first = snapshot(&dir);
        save(&target, &mut first, Duration::from_secs(1)).unwrap();
        let mut second = snapshot(&dir);
        save(&target, &mut second, Duration::from_secs(1)).unwrap();

        let loaded = load(&target).unwrap().unwrap();
        assert_eq!(loaded.files, first.files);
        assert_eq!(loaded.created_at, first.created_at);
    }

    #[test]
    fn retain_tracked_drops_newly_excluded_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("gen")).unwrap();
        std::fs::write(dir.path().join("gen/out.txt"), "g").unwrap();
        std::fs::write(dir.path().join("keep.txt"), "k").unwrap();

        let mut baseline = snapshot(&dir);
        baseline.retain_tracked(&ExcludeRules::with_user_rules(&["gen/**".to_string()]));
        assert_eq!(baseline.files.keys().collect::<Vec<_>>(), vec!["keep.txt"]);
        assert_eq!(baseline.file_count, 1);
    }
}
