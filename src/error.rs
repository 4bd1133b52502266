/// Crate-level error types for driftline diagnostics.
use std::time::Duration;

/// All errors in driftline carry enough context to produce a useful diagnostic
/// without a debugger. Paths stored here are project-relative or redacted, never
/// absolute, so messages are safe to hand across the trust boundary.
#[allow(clippy::error_impl_error, reason = "crate-level error type re-exported as driftline::Error")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `initialize` was called while a baseline is already present.
    #[error("baseline already exists: {file} (pass reset to overwrite)")]
    BaselineExists {
        /// State-relative name of the existing baseline file.
        file: String,
    },

    /// An operation needed a baseline that has not been created yet.
    #[error("baseline not found: {file}")]
    BaselineNotFound {
        /// State-relative name of the missing baseline file.
        file: String,
    },

    /// A path, directly or through symlinks, resolves outside the project root.
    #[error("path escapes project root: {path}")]
    BoundaryViolation {
        /// The offending path, relative to the root or redacted.
        path: String,
    },

    /// The advisory lock guarding a baseline could not be acquired in time.
    #[error("could not lock {file} within {}s (held by another driftline process?)", waited.as_secs())]
    ConcurrencyError {
        /// Lock file that stayed held.
        file: String,
        /// How long acquisition was retried before giving up.
        waited: Duration,
    },

    /// Source file exceeds the extractor's size limit.
    #[error("file too large ({size_bytes} bytes, max {max_bytes}): {file}")]
    FileTooLarge {
        /// File that exceeded the size limit.
        file: String,
        /// Maximum allowed file size in bytes.
        max_bytes: u64,
        /// Actual file size in bytes.
        size_bytes: u64,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// Tree-sitter failed to parse a source file.
    #[error("parse failed: {file}: {reason}")]
    ParseFailed {
        /// File that failed to parse.
        file: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// A symlink chain was longer than the configured resolution depth.
    #[error("symlink chain deeper than {max_depth} links: {path}")]
    RecursionLimitExceeded {
        /// Configured maximum number of symlink hops.
        max_depth: usize,
        /// Path whose resolution was abandoned.
        path: String,
    },

    /// A hard bound (tracked file count) was exceeded; the operation aborted.
    #[error("{resource} limit of {limit} exceeded. {guidance}")]
    ResourceLimitExceeded {
        /// Remediation text for the caller.
        guidance: String,
        /// The configured ceiling.
        limit: usize,
        /// What was being counted.
        resource: &'static str,
    },

    /// A revision identifier that cannot be passed safely to the VCS.
    #[error("invalid revision: `{revision}`")]
    RevisionInvalid {
        /// The rejected revision string.
        revision: String,
    },

    /// A baseline file is present but not valid JSON, or a record is incomplete.
    #[error("serialization: {file}: {reason}")]
    SerializationError {
        /// Baseline file or record that failed.
        file: String,
        /// Description of the failure.
        reason: String,
    },

    /// The operation ran past its deadline and was abandoned.
    #[error("{operation} exceeded its {}s deadline. {guidance}", deadline.as_secs())]
    TimeoutExceeded {
        /// The configured deadline.
        deadline: Duration,
        /// Remediation text for the caller.
        guidance: String,
        /// Name of the abandoned operation.
        operation: &'static str,
    },

    /// TOML deserialization of the settings file failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// A version-control query failed.
    #[error("vcs: {reason}")]
    Vcs {
        /// Sanitized stderr or failure description.
        reason: String,
    },
}

impl Error {
    /// Whether this error only disqualifies one entry of a bulk operation.
    ///
    /// Boundary and symlink-depth failures on individual entries are skip
    /// signals; everything else aborts the operation.
    pub const fn is_skippable(&self) -> bool {
        return matches!(self, Self::BoundaryViolation { .. } | Self::RecursionLimitExceeded { .. });
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
