//! Lifecycle operations over one project root: initialize, update, and the
//! read-only checks that compare the tree against its baselines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::boundary::Boundary;
use crate::checksum::{self, ChecksumBaseline};
use crate::compare::{self, VisibilityPolicy};
use crate::config::{DEFAULT_STATE_DIR, Settings};
use crate::error::{Error, Result};
use crate::exclude::ExcludeRules;
use crate::extractor::{self, Extraction, SkipReason};
use crate::governor::{Deadline, run_with_deadline};
use crate::grammar::LanguageRegistry;
use crate::lock::BaselineLock;
use crate::symbols::{self, SymbolBaseline};
use crate::types::{FileChange, SemanticChange, Symbol};
use crate::vcs;
use crate::walker;

/// Checksum baseline location inside the state directory.
pub const CHECKSUM_BASELINE: &str = "memory/repo-baseline.json";

/// Symbol baseline location inside the state directory.
pub const SYMBOL_BASELINE: &str = "memory/symbol-baseline.json";

/// What an initialize or update wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineSummary {
    /// Files fingerprinted.
    pub files: usize,
    /// Files whose symbols could not be extracted.
    pub skipped: Vec<(String, SkipReason)>,
    /// Symbols recorded.
    pub symbols: usize,
}

/// What a baseline write expects to find once it holds the locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Existing {
    /// Neither baseline may be present.
    Forbidden,
    /// Present baselines are replaced.
    Ignored,
    /// At least one baseline must be present.
    Required,
}

/// A project root with its settings, grammar registry, and baselines.
#[derive(Debug)]
pub struct Engine {
    /// Gate for every path the engine touches.
    boundary: Boundary,
    /// Extension → grammar adapter.
    registry: LanguageRegistry,
    /// Built-in and user exclude rules, plus the state directory.
    rules: ExcludeRules,
    /// Loaded settings.
    settings: Settings,
    /// Canonical state directory, proven to be inside the root.
    state_dir: PathBuf,
}

impl Engine {
    /// Absolute path of the checksum baseline.
    pub fn checksum_path(&self) -> PathBuf {
        return self.state_dir.join(CHECKSUM_BASELINE);
    }

    /// File-level changes since the checksum baseline. Read-only.
    ///
    /// # Errors
    ///
    /// Returns `Error::BaselineNotFound` without a baseline, and
    /// `ResourceLimitExceeded` or `TimeoutExceeded` from the walk.
    pub fn check(&self) -> Result<Vec<FileChange>> {
        let Some(mut baseline) = checksum::load(&self.baseline_target(CHECKSUM_BASELINE)?)? else {
            return Err(Error::BaselineNotFound { file: CHECKSUM_BASELINE.to_string() });
        };
        baseline.retain_tracked(&self.rules);

        let changes = run_with_deadline("check", self.settings.timeout, |deadline| {
            let current = checksum::compute_snapshot(&self.boundary, &self.rules, self.settings.max_files, deadline)?;
            return Ok(compare::compare_checksums(&baseline.files, &current.files));
        })?;
        tracing::info!(changes = changes.len(), "checksum comparison done");
        return Ok(changes);
    }

    /// Files changed between `revision` and the working tree.
    ///
    /// # Errors
    ///
    /// Returns `Error::RevisionInvalid`, `Error::Vcs`, or `TimeoutExceeded`.
    /// A git process still running at the deadline is killed.
    pub fn changes_since(&self, revision: &str) -> Result<Vec<FileChange>> {
        return run_with_deadline("changes_since", self.settings.timeout, |deadline| {
            return vcs::changed_files_since(&self.boundary, revision, &self.rules, deadline);
        });
    }

    /// Symbols of the current tree, without touching any baseline.
    ///
    /// # Errors
    ///
    /// Returns `ResourceLimitExceeded` or `TimeoutExceeded`.
    pub fn extract_symbols(&self) -> Result<Extraction> {
        return run_with_deadline("extract_symbols", self.settings.timeout, |deadline| {
            return self.extract_with(deadline);
        });
    }

    /// Create both baselines. Presence is checked again once the baseline
    /// locks are held, so of two overlapping calls without `reset` only one
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Error::BaselineExists` if either baseline is present and
    /// `reset` is false, plus any boundary, walk, timeout, lock, or save error.
    pub fn initialize(&self, reset: bool) -> Result<BaselineSummary> {
        let existing = if reset { Existing::Ignored } else { Existing::Forbidden };
        self.expect_existing(existing)?;
        let summary = self.snapshot_and_save(existing)?;
        tracing::info!(files = summary.files, symbols = summary.symbols, reset, "baselines initialized");
        return Ok(summary);
    }

    /// Open `root` with settings from its `.driftline.toml` and every
    /// built-in grammar.
    ///
    /// # Errors
    ///
    /// Returns settings errors, or `Error::Io` if the root cannot be resolved.
    pub fn open(root: &Path) -> Result<Self> {
        let settings = Settings::load(root)?;
        return Self::with_registry(root, settings, LanguageRegistry::with_default_adapters());
    }

    /// Classified symbol changes since the symbol baseline. Read-only.
    ///
    /// # Errors
    ///
    /// Returns `Error::BaselineNotFound` without a baseline, and
    /// `ResourceLimitExceeded` or `TimeoutExceeded` from the walk.
    pub fn semantic_diff(&self) -> Result<Vec<SemanticChange>> {
        let Some(baseline) = symbols::load(&self.baseline_target(SYMBOL_BASELINE)?)? else {
            return Err(Error::BaselineNotFound { file: SYMBOL_BASELINE.to_string() });
        };
        let old: BTreeMap<String, Vec<Symbol>> =
            baseline.symbols.into_iter().filter(|(file, _)| return !self.rules.is_excluded(file)).collect();
        let policy: VisibilityPolicy = self.settings.visibility_policy();

        let changes = run_with_deadline("semantic_diff", self.settings.timeout, |deadline| {
            let current = self.extract_with(deadline)?;
            return Ok(compare::compare_symbols(&old, &current.symbols, &policy));
        })?;
        tracing::info!(changes = changes.len(), "semantic comparison done");
        return Ok(changes);
    }

    /// Absolute path of the symbol baseline.
    pub fn symbol_path(&self) -> PathBuf {
        return self.state_dir.join(SYMBOL_BASELINE);
    }

    /// Refresh both baselines, keeping their `createdAt`.
    ///
    /// # Errors
    ///
    /// Returns `Error::BaselineNotFound` if neither baseline exists yet, plus
    /// any boundary, walk, timeout, lock, or save error.
    pub fn update(&self) -> Result<BaselineSummary> {
        self.expect_existing(Existing::Required)?;
        let summary = self.snapshot_and_save(Existing::Required)?;
        tracing::info!(files = summary.files, symbols = summary.symbols, "baselines updated");
        return Ok(summary);
    }

    /// Open `root` with explicit settings and grammar registry.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the root cannot be canonicalized, and
    /// `Error::BoundaryViolation` if the state directory resolves outside it
    /// (`..`, an absolute path, or a symlink).
    pub fn with_registry(root: &Path, settings: Settings, registry: LanguageRegistry) -> Result<Self> {
        let boundary = Boundary::new(root, settings.max_symlink_depth)?;
        let state_dir = boundary.validate(&settings.state_dir)?;

        // A relocated state directory is not covered by the built-in rules.
        let rules = match boundary.relative(&state_dir) {
            Some(relative) if relative != DEFAULT_STATE_DIR => {
                let mut user_rules = settings.exclude.clone();
                user_rules.push(format!("{relative}/**"));
                ExcludeRules::with_user_rules(&user_rules)
            },
            _ => settings.exclude_rules(),
        };
        tracing::debug!(rules = rules.patterns().len(), languages = registry.extensions().count(), "engine opened");

        return Ok(Self { boundary, registry, rules, settings, state_dir });
    }

    /// A baseline location, re-proven to be inside the root at the moment
    /// it is used.
    fn baseline_target(&self, name: &str) -> Result<PathBuf> {
        return self.boundary.validate(&self.state_dir.join(name));
    }

    /// Fail unless the baselines on disk match `existing`.
    fn expect_existing(&self, existing: Existing) -> Result<()> {
        let checksum_present = self.baseline_target(CHECKSUM_BASELINE)?.exists();
        let symbol_present = self.baseline_target(SYMBOL_BASELINE)?.exists();
        return match existing {
            Existing::Forbidden if checksum_present => {
                Err(Error::BaselineExists { file: CHECKSUM_BASELINE.to_string() })
            },
            Existing::Forbidden if symbol_present => Err(Error::BaselineExists { file: SYMBOL_BASELINE.to_string() }),
            Existing::Required if !checksum_present && !symbol_present => {
                Err(Error::BaselineNotFound { file: CHECKSUM_BASELINE.to_string() })
            },
            Existing::Forbidden | Existing::Ignored | Existing::Required => Ok(()),
        };
    }

    /// Walk and extract under an existing deadline.
    fn extract_with(&self, deadline: &Deadline) -> Result<Extraction> {
        let files = walker::enumerate(&self.boundary, &self.rules, self.settings.max_files, deadline)?;
        return extractor::extract(&files, &self.registry, deadline);
    }

    /// Compute both snapshots under the deadline, then replace both baselines
    /// under both locks. Nothing is written unless both snapshots completed
    /// and both documents were staged.
    fn snapshot_and_save(&self, existing: Existing) -> Result<BaselineSummary> {
        let (mut checksums, extraction): (ChecksumBaseline, Extraction) =
            run_with_deadline("snapshot", self.settings.timeout, |deadline| {
                let checksums =
                    checksum::compute_snapshot(&self.boundary, &self.rules, self.settings.max_files, deadline)?;
                let extraction = self.extract_with(deadline)?;
                return Ok((checksums, extraction));
            })?;
        let mut symbol_baseline = SymbolBaseline::new(self.boundary.root(), extraction.symbols);

        // Always checksum first, then symbols.
        let checksum_lock = BaselineLock::acquire(&self.baseline_target(CHECKSUM_BASELINE)?, self.settings.lock_timeout)?;
        let symbol_lock = BaselineLock::acquire(&self.baseline_target(SYMBOL_BASELINE)?, self.settings.lock_timeout)?;
        self.expect_existing(existing)?;

        let checksum_write = checksum::stage(&checksum_lock, &mut checksums)?;
        let symbol_write = symbols::stage(&symbol_lock, &mut symbol_baseline)?;
        checksum_write.commit()?;
        symbol_write.commit()?;
        drop(symbol_lock);
        drop(checksum_lock);

        return Ok(BaselineSummary {
            files: checksums.file_count,
            skipped: extraction.skipped,
            symbols: symbol_baseline.symbol_count(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    use crate::types::{FileChangeType, Severity, SymbolChangeType};

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "def run(x):\n    return x\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        return dir;
    }

    #[test]
    fn initialize_twice_needs_reset() {
        let dir = project();
        let engine = Engine::open(dir.path()).unwrap();

        let summary = engine.initialize(false).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.symbols, 1);
        assert!(engine.checksum_path().exists());
        assert!(engine.symbol_path().exists());

        assert!(matches!(engine.initialize(false), Err(Error::BaselineExists { .. })));
        assert!(engine.initialize(true).is_ok());
    }

    #[test]
    fn update_without_baseline_fails() {
        let dir = project();
        let engine = Engine::open(dir.path()).unwrap();
        assert!(matches!(engine.update(), Err(Error::BaselineNotFound { .. })));
        assert!(matches!(engine.check(), Err(Error::BaselineNotFound { .. })));
        assert!(matches!(engine.semantic_diff(), Err(Error::BaselineNotFound { .. })));
    }

    #[test]
    fn check_reports_modified_file_and_ignores_state_dir() {
        let dir = project();
        let engine = Engine::open(dir.path()).unwrap();
        engine.initialize(false).unwrap();
        assert!(engine.check().unwrap().is_empty());

        std::fs::write(dir.path().join("notes.txt"), "changed").unwrap();
        assert_eq!(
            engine.check().unwrap(),
            vec![FileChange { change_type: FileChangeType::Modified, file: "notes.txt".into() }]
        );
    }

    #[test]
    fn semantic_diff_flags_public_signature_change() {
        let dir = project();
        let engine = Engine::open(dir.path()).unwrap();
        engine.initialize(false).unwrap();

        std::fs::write(dir.path().join("app.py"), "def run(x, y):\n    return x\n").unwrap();
        let changes = engine.semantic_diff().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, SymbolChangeType::SignatureChanged);
        assert_eq!(changes[0].severity, Severity::Breaking);
    }

    #[test]
    fn ceiling_failure_writes_nothing() {
        let dir = project();
        let settings = Settings { max_files: 1, ..Settings::default() };
        let engine = Engine::with_registry(dir.path(), settings, LanguageRegistry::with_default_adapters()).unwrap();

        assert!(matches!(engine.initialize(false), Err(Error::ResourceLimitExceeded { limit: 1, .. })));
        assert!(!engine.checksum_path().exists());
        assert!(!engine.symbol_path().exists());
    }

    #[test]
    fn custom_state_dir_is_not_tracked() {
        let dir = project();
        let settings = Settings { state_dir: PathBuf::from("var/state"), ..Settings::default() };
        let engine = Engine::with_registry(dir.path(), settings, LanguageRegistry::with_default_adapters()).unwrap();
        engine.initialize(false).unwrap();
        engine.update().unwrap();
        assert!(engine.check().unwrap().is_empty());
    }

    #[test]
    fn state_dir_outside_root_is_rejected() {
        let dir = project();
        let outside = tempfile::tempdir().unwrap();
        for state_dir in [PathBuf::from("../elsewhere"), outside.path().to_path_buf()] {
            let settings = Settings { state_dir, ..Settings::default() };
            let err = Engine::with_registry(dir.path(), settings, LanguageRegistry::with_default_adapters()).unwrap_err();
            assert!(matches!(err, Error::BoundaryViolation { .. }), "{err}");
        }
        assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_state_dir_is_rejected() {
        let dir = project();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join(DEFAULT_STATE_DIR)).unwrap();

        let err = Engine::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::BoundaryViolation { .. }), "{err}");
        assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_baseline_dir_is_rejected_at_save() {
        let dir = project();
        let outside = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(DEFAULT_STATE_DIR)).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join(DEFAULT_STATE_DIR).join("memory")).unwrap();

        let engine = Engine::open(dir.path()).unwrap();
        let err = engine.initialize(false).unwrap_err();
        assert!(matches!(err, Error::BoundaryViolation { .. }), "{err}");
        assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[test]
    fn overlapping_initializes_admit_exactly_one() {
        let dir = project();
        for i in 0..50 {
            std::fs::write(dir.path().join(format!("f{i}.py")), format!("def f{i}():\n    pass\n")).unwrap();
        }
        let root = dir.path().to_path_buf();
        let start = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let root = root.clone();
                let start = Arc::clone(&start);
                std::thread::spawn(move || {
                    let engine = Engine::open(&root).unwrap();
                    start.wait();
                    engine.initialize(false)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{results:?}");
        assert!(results.iter().any(|r| matches!(r, Err(Error::BaselineExists { .. }))));
    }

    #[test]
    fn blocked_symbol_save_leaves_checksum_baseline_untouched() {
        let dir = project();
        let settings = Settings { lock_timeout: Duration::from_millis(50), ..Settings::default() };
        let engine = Engine::with_registry(dir.path(), settings, LanguageRegistry::with_default_adapters()).unwrap();
        engine.initialize(false).unwrap();
        let before = std::fs::read(engine.checksum_path()).unwrap();

        std::fs::write(dir.path().join("notes.txt"), "changed").unwrap();
        let _held = BaselineLock::acquire(&engine.symbol_path(), Duration::from_secs(1)).unwrap();
        assert!(matches!(engine.update(), Err(Error::ConcurrencyError { .. })));

        assert_eq!(std::fs::read(engine.checksum_path()).unwrap(), before);
        assert_eq!(engine.check().unwrap().len(), 1);
    }
}
