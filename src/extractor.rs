//! Symbol extraction driver: per-file outcomes aggregated into a snapshot.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::governor::Deadline;
use crate::grammar::LanguageRegistry;
use crate::types::{Symbol, TrackedFile};

/// Files larger than this are not parsed.
pub const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Parsed; the declarations found (possibly none).
    Extracted(Vec<Symbol>),
    /// Not parsed, for the given reason.
    Skipped(SkipReason),
}

/// Why a file produced no symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Not valid UTF-8 text.
    NotText,
    /// The grammar rejected the file.
    ParseFailed(String),
    /// Larger than `MAX_FILE_SIZE`.
    TooLarge(u64),
    /// Could not be read.
    Unreadable(String),
    /// No adapter is registered for the extension.
    Unsupported,
}

/// Aggregated result of extracting a set of files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Files that failed, with the reason. Unsupported files are not listed.
    pub skipped: Vec<(String, SkipReason)>,
    /// Relative path → symbols ordered by position. Files without symbols are omitted.
    pub symbols: BTreeMap<String, Vec<Symbol>>,
}

/// Extract symbols from every file with a registered adapter.
///
/// Individual file failures are recorded in `Extraction::skipped` and never
/// abort the run.
///
/// # Errors
///
/// Returns `Error::TimeoutExceeded` when the deadline expires.
pub fn extract(files: &[TrackedFile], registry: &LanguageRegistry, deadline: &Deadline) -> Result<Extraction> {
    let mut extraction = Extraction::default();

    for file in files {
        deadline.check()?;
        match extract_file(file, registry) {
            FileOutcome::Extracted(symbols) if symbols.is_empty() => {},
            FileOutcome::Extracted(symbols) => {
                extraction.symbols.insert(file.relative.clone(), symbols);
            },
            FileOutcome::Skipped(SkipReason::Unsupported) => {},
            FileOutcome::Skipped(reason) => {
                tracing::warn!(file = %file.relative, reason = ?reason, "skipping file during extraction");
                extraction.skipped.push((file.relative.clone(), reason));
            },
        }
    }

    let total: usize = extraction.symbols.values().map(Vec::len).sum();
    tracing::debug!(files = extraction.symbols.len(), symbols = total, skipped = extraction.skipped.len(), "extraction done");
    return Ok(extraction);
}

/// Read, size-check, and parse one file.
pub fn extract_file(file: &TrackedFile, registry: &LanguageRegistry) -> FileOutcome {
    let Some(adapter) = registry.adapter_for(Path::new(&file.relative)) else {
        return FileOutcome::Skipped(SkipReason::Unsupported);
    };

    match check_size(file) {
        Err(Error::FileTooLarge { size_bytes, .. }) => return FileOutcome::Skipped(SkipReason::TooLarge(size_bytes)),
        Err(e) => return FileOutcome::Skipped(SkipReason::Unreadable(e.to_string())),
        Ok(()) => {},
    }

    let bytes = match std::fs::read(&file.absolute) {
        Err(e) => return FileOutcome::Skipped(SkipReason::Unreadable(e.kind().to_string())),
        Ok(b) => b,
    };
    let Ok(source) = String::from_utf8(bytes) else {
        return FileOutcome::Skipped(SkipReason::NotText);
    };

    return match adapter.extract(&file.relative, &source) {
        Err(Error::ParseFailed { reason, .. }) => FileOutcome::Skipped(SkipReason::ParseFailed(reason)),
        Err(e) => FileOutcome::Skipped(SkipReason::ParseFailed(e.to_string())),
        Ok(mut symbols) => {
            symbols.sort_by(|a, b| return (a.line, a.column, &a.name).cmp(&(b.line, b.column, &b.name)));
            FileOutcome::Extracted(symbols)
        },
    };
}

/// Refuse files over `MAX_FILE_SIZE` before reading them.
///
/// # Errors
///
/// Returns `Error::FileTooLarge` past the limit or `Error::Io` if metadata fails.
fn check_size(file: &TrackedFile) -> Result<()> {
    let size_bytes = std::fs::metadata(&file.absolute)?.len();
    if size_bytes > MAX_FILE_SIZE {
        return Err(Error::FileTooLarge { file: file.relative.clone(), max_bytes: MAX_FILE_SIZE, size_bytes });
    }
    return Ok(());
}
