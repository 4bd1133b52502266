use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::boundary::{Boundary, DEFAULT_MAX_SYMLINK_DEPTH};
use crate::compare::{Convention, VisibilityPolicy};
use crate::error::{Error, Result};
use crate::exclude::ExcludeRules;
use crate::governor::{DEFAULT_MAX_FILES, DEFAULT_TIMEOUT};
use crate::lock::DEFAULT_LOCK_TIMEOUT;

/// Name of the settings file looked up in the project root.
pub const SETTINGS_FILE: &str = ".driftline.toml";

/// Default state directory, relative to the project root.
pub const DEFAULT_STATE_DIR: &str = ".driftline";

/// Project settings loaded from `.driftline.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// User exclude rules, applied after the built-in defaults.
    pub exclude: Vec<String>,
    /// How long a baseline save waits for a held lock.
    pub lock_timeout: Duration,
    /// Ceiling on tracked files.
    pub max_files: usize,
    /// Maximum symlink hops followed per path.
    pub max_symlink_depth: usize,
    /// Where baselines live, relative to the root.
    pub state_dir: PathBuf,
    /// Per-operation deadline.
    pub timeout: Duration,
    /// Extension → visibility convention overrides.
    pub visibility: BTreeMap<String, Convention>,
}

/// Raw TOML structure for `.driftline.toml`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct DriftlineToml {
    #[serde(default)]
    exclude: Vec<String>,
    lock_timeout_secs: Option<u64>,
    max_files: Option<usize>,
    max_symlink_depth: Option<usize>,
    state_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    #[serde(default)]
    visibility: BTreeMap<String, Convention>,
}

impl Default for Settings {
    fn default() -> Self {
        return Self {
            exclude: Vec::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_files: DEFAULT_MAX_FILES,
            max_symlink_depth: DEFAULT_MAX_SYMLINK_DEPTH,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            timeout: DEFAULT_TIMEOUT,
            visibility: BTreeMap::new(),
        };
    }
}

impl Settings {
    /// Built-in exclude rules followed by the user's.
    pub fn exclude_rules(&self) -> ExcludeRules {
        return ExcludeRules::with_user_rules(&self.exclude);
    }

    /// Load settings from `.driftline.toml` in `root`.
    /// Returns defaults if the file doesn't exist. A file that exists but
    /// is malformed is an error; a written config is never silently ignored.
    /// The file is read through the path gate, so a settings symlink that
    /// leaves the root is refused.
    ///
    /// # Errors
    ///
    /// Returns `Error::BoundaryViolation` if the file resolves outside the
    /// root, `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self> {
        let boundary = Boundary::new(root, DEFAULT_MAX_SYMLINK_DEPTH)?;
        let path = boundary.validate(Path::new(SETTINGS_FILE))?;
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(&content);
    }

    /// Parse settings text, filling unset knobs with defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed or has unknown keys.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: DriftlineToml = toml::from_str(content)?;
        let defaults = Self::default();
        return Ok(Self {
            exclude: raw.exclude,
            lock_timeout: raw.lock_timeout_secs.map_or(defaults.lock_timeout, Duration::from_secs),
            max_files: raw.max_files.unwrap_or(defaults.max_files),
            max_symlink_depth: raw.max_symlink_depth.unwrap_or(defaults.max_symlink_depth),
            state_dir: raw.state_dir.unwrap_or(defaults.state_dir),
            timeout: raw.timeout_secs.map_or(defaults.timeout, Duration::from_secs),
            visibility: raw.visibility,
        });
    }

    /// Default naming conventions with the `[visibility]` overrides applied.
    pub fn visibility_policy(&self) -> VisibilityPolicy {
        return VisibilityPolicy::with_overrides(&self.visibility);
    }
}
