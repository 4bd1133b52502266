//! Bounded, pruning enumeration of the files under a project root.

use walkdir::WalkDir;

use crate::boundary::Boundary;
use crate::error::Result;
use crate::exclude::ExcludeRules;
use crate::governor::{self, Deadline};
use crate::types::TrackedFile;

/// Lazy, single-pass walk over tracked files.
///
/// Excluded directories are skipped before they are opened, every entry is
/// passed through the boundary gate, and the walk fails with
/// `ResourceLimitExceeded` on the first file past the ceiling. Entries come
/// out in file-name order within each directory.
pub struct Enumerator<'a> {
    /// Gate for every yielded entry; also supplies the canonical root.
    boundary: &'a Boundary,
    /// Maximum number of files to yield.
    ceiling: usize,
    /// Files yielded so far.
    count: usize,
    /// Checked before each entry.
    deadline: &'a Deadline,
    /// Set after the walk has failed; the iterator then stays empty.
    done: bool,
    /// Exclusion rules evaluated on relative paths.
    rules: &'a ExcludeRules,
    /// Underlying directory walker.
    walk: walkdir::IntoIter,
}

impl<'a> Enumerator<'a> {
    /// Start a walk at the boundary's root.
    pub fn new(boundary: &'a Boundary, rules: &'a ExcludeRules, ceiling: usize, deadline: &'a Deadline) -> Self {
        let walk = WalkDir::new(boundary.root())
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        return Self { boundary, ceiling, count: 0, deadline, done: false, rules, walk };
    }

    /// Decide what to do with one walk entry. `Ok(None)` means "skip".
    fn visit(&mut self, entry: &walkdir::DirEntry) -> Result<Option<TrackedFile>> {
        if entry.depth() == 0 {
            return Ok(None);
        }
        let Some(relative) = self.boundary.relative(entry.path()) else {
            return Ok(None);
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if self.rules.is_excluded(&relative) {
                tracing::trace!(dir = %relative, "pruned excluded directory");
                self.walk.skip_current_dir();
            }
            return Ok(None);
        }
        if self.rules.is_excluded(&relative) {
            return Ok(None);
        }

        let absolute = match self.boundary.validate(entry.path()) {
            Err(e) => {
                tracing::debug!(file = %relative, reason = %e, skippable = e.is_skippable(), "skipping entry");
                return Ok(None);
            },
            Ok(p) => p,
        };

        // Symlinked directories are not descended into; their targets inside
        // the root are reached by the walk itself.
        if file_type.is_symlink() && !absolute.is_file() {
            return Ok(None);
        }

        if self.count >= self.ceiling {
            return Err(governor::file_limit_error(self.ceiling));
        }
        self.count = self.count.saturating_add(1);

        return Ok(Some(TrackedFile { absolute, relative }));
    }
}

impl Iterator for Enumerator<'_> {
    type Item = Result<TrackedFile>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Err(e) = self.deadline.check() {
                self.done = true;
                return Some(Err(e));
            }

            let entry = match self.walk.next()? {
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable directory entry");
                    continue;
                },
                Ok(entry) => entry,
            };

            match self.visit(&entry) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                },
                Ok(None) => {},
                Ok(Some(file)) => return Some(Ok(file)),
            }
        }
    }
}

/// Collect a full walk, failing on the first fatal error.
///
/// # Errors
///
/// Returns `Error::ResourceLimitExceeded` past the ceiling or
/// `Error::TimeoutExceeded` when the deadline expires.
pub fn enumerate(boundary: &Boundary, rules: &ExcludeRules, ceiling: usize, deadline: &Deadline) -> Result<Vec<TrackedFile>> {
    return Enumerator::new(boundary, rules, ceiling, deadline).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::boundary::DEFAULT_MAX_SYMLINK_DEPTH;

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            let path = dir.path().join(f);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, f.as_bytes()).unwrap();
        }
        return dir;
    }

    fn walk(dir: &tempfile::TempDir, rules: &ExcludeRules, ceiling: usize) -> Result<Vec<String>> {
        let boundary = Boundary::new(dir.path(), DEFAULT_MAX_SYMLINK_DEPTH).unwrap();
        let deadline = Deadline::unbounded("test");
        let files = enumerate(&boundary, rules, ceiling, &deadline)?;
        return Ok(files.into_iter().map(|f| f.relative).collect());
    }

    #[test]
    fn yields_relative_sorted_paths() {
        let dir = tree(&["b.py", "a/z.py", "a/y.md"]);
        let files = walk(&dir, &ExcludeRules::defaults(), 10).unwrap();
        assert_eq!(files, vec!["a/y.md", "a/z.py", "b.py"]);
    }

    #[test]
    fn exactly_ceiling_files_succeeds() {
        let dir = tree(&["1.txt", "2.txt", "3.txt"]);
        let files = walk(&dir, &ExcludeRules::defaults(), 3).unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn one_past_ceiling_fails_naming_the_limit() {
        let dir = tree(&["1.txt", "2.txt", "3.txt", "4.txt"]);
        let err = walk(&dir, &ExcludeRules::defaults(), 3).unwrap_err();
        match err {
            Error::ResourceLimitExceeded { limit, guidance, .. } => {
                assert_eq!(limit, 3);
                assert!(guidance.contains("max_files"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn excluded_subtree_is_never_counted() {
        let mut names: Vec<String> = (0..50).map(|i| format!("generated/f{i}.txt")).collect();
        names.push("keep.txt".to_string());
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = tree(&refs);

        // A ceiling of 1 would trip immediately if the subtree were walked.
        let rules = ExcludeRules::with_user_rules(&["generated/**".to_string()]);
        let files = walk(&dir, &rules, 1).unwrap();
        assert_eq!(files, vec!["keep.txt"]);
    }

    #[test]
    fn default_excludes_skip_vcs_and_dependencies() {
        let dir = tree(&[".git/HEAD", "node_modules/x/index.js", "src/main.rs", "app.log"]);
        let files = walk(&dir, &ExcludeRules::defaults(), 10).unwrap();
        assert_eq!(files, vec!["src/main.rs"]);
    }

    #[test]
    fn expired_deadline_stops_the_walk() {
        let dir = tree(&["a.txt"]);
        let boundary = Boundary::new(dir.path(), DEFAULT_MAX_SYMLINK_DEPTH).unwrap();
        let deadline = Deadline::start("walk", std::time::Duration::ZERO);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let err = enumerate(&boundary, &ExcludeRules::defaults(), 10, &deadline).unwrap_err();
        assert!(matches!(err, Error::TimeoutExceeded { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn escaping_symlink_is_skipped_not_fatal() {
        let outside = tree(&["secret.txt"]);
        let dir = tree(&["inside.txt"]);
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("leak.txt")).unwrap();

        let files = walk(&dir, &ExcludeRules::defaults(), 10).unwrap();
        assert_eq!(files, vec!["inside.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn internal_file_symlink_is_tracked() {
        let dir = tree(&["real.txt"]);
        std::os::unix::fs::symlink("real.txt", dir.path().join("alias.txt")).unwrap();

        let files = walk(&dir, &ExcludeRules::defaults(), 10).unwrap();
        assert_eq!(files, vec!["alias.txt", "real.txt"]);
    }
}
