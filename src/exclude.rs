//! Exclude rules: built-in defaults plus user globs, matched against
//! project-relative, forward-slash paths.
//!
//! Three rule forms are recognized:
//! - `**/X` matches `X` at any depth (any suffix starting at a `/` boundary),
//! - `X/**` matches the directory `X` itself and everything beneath it,
//! - anything else is a plain glob over the whole relative path, where `*`
//!   never crosses a `/`.

use globset::{Glob, GlobBuilder, GlobMatcher};

/// Rules applied to every enumeration. User rules are appended, never substituted.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/.hg/**",
    "**/.svn/**",
    "**/node_modules/**",
    "**/bower_components/**",
    "**/vendor/bundle/**",
    "**/.venv/**",
    "**/venv/**",
    "**/__pycache__/**",
    "**/.mypy_cache/**",
    "**/.pytest_cache/**",
    "**/.ruff_cache/**",
    "**/.tox/**",
    "**/.cache/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/*.pyc",
    "**/.env",
    "**/.env.*",
    "**/*.pem",
    "**/*.key",
    "**/id_rsa*",
    "**/*.log",
    "**/.DS_Store",
    "**/.driftline/**",
];

/// One compiled exclude rule.
#[derive(Debug, Clone)]
enum Rule {
    /// `**/X`: the inner rule may match any path suffix.
    AnyDepth(Box<Rule>),
    /// A plain glob over the whole path.
    Plain(GlobMatcher),
    /// `X/**`: a directory prefix matching the glob, or the path itself.
    Subtree(GlobMatcher),
}

impl Rule {
    /// Compile a rule string, peeling the `**/` and `/**` forms.
    fn compile(pattern: &str) -> Result<Self, globset::Error> {
        if let Some(rest) = pattern.strip_prefix("**/")
            && !rest.is_empty()
        {
            return Ok(Self::AnyDepth(Box::new(Self::compile(rest)?)));
        }
        if let Some(dir) = pattern.strip_suffix("/**")
            && !dir.is_empty()
        {
            return Ok(Self::Subtree(glob(dir)?));
        }
        return Ok(Self::Plain(glob(pattern)?));
    }

    /// Whether this rule excludes `path`.
    fn matches(&self, path: &str) -> bool {
        return match self {
            Self::AnyDepth(inner) => suffixes(path).any(|s| return inner.matches(s)),
            Self::Plain(matcher) => matcher.is_match(path),
            Self::Subtree(matcher) => prefixes(path).any(|p| return matcher.is_match(p)),
        };
    }
}

/// The merged default + user rule set.
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    /// Compiled rules in declaration order.
    rules: Vec<Rule>,
    /// Source strings, kept for display and diagnostics.
    sources: Vec<String>,
}

impl ExcludeRules {
    /// Only the built-in defaults.
    pub fn defaults() -> Self {
        return Self::with_user_rules(&[]);
    }

    /// Whether `relative` (forward-slash, no leading `/`) is excluded.
    pub fn is_excluded(&self, relative: &str) -> bool {
        let path = relative.trim_start_matches("./");
        return self.rules.iter().any(|r| return r.matches(path));
    }

    /// The rule strings in effect, defaults first.
    pub fn patterns(&self) -> &[String] {
        return &self.sources;
    }

    /// Defaults followed by `user` rules. Invalid user globs are logged and
    /// ignored so one typo does not disable the whole rule set.
    pub fn with_user_rules(user: &[String]) -> Self {
        let mut rules = Vec::new();
        let mut sources = Vec::new();

        let all = DEFAULT_EXCLUDES.iter().map(|s| return (*s).to_string()).chain(user.iter().cloned());
        for pattern in all {
            let trimmed = pattern.trim().trim_start_matches("./").to_string();
            if trimmed.is_empty() {
                continue;
            }
            match Rule::compile(&trimmed) {
                Err(e) => tracing::warn!(pattern = %trimmed, error = %e, "ignoring invalid exclude rule"),
                Ok(rule) => {
                    rules.push(rule);
                    sources.push(trimmed);
                },
            }
        }

        return Self { rules, sources };
    }
}

/// Build a matcher where `*` and `?` stay within one path component.
fn glob(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    let built: Glob = GlobBuilder::new(pattern).literal_separator(true).build()?;
    return Ok(built.compile_matcher());
}

/// `a/b/c` → `a`, `a/b`, `a/b/c`.
fn prefixes(path: &str) -> impl Iterator<Item = &str> {
    return path
        .match_indices('/')
        .map(|(i, _)| return path.get(..i).unwrap_or(path))
        .chain(std::iter::once(path));
}

/// `a/b/c` → `a/b/c`, `b/c`, `c`.
fn suffixes(path: &str) -> impl Iterator<Item = &str> {
    return std::iter::once(path).chain(
        path.match_indices('/')
            .map(|(i, _)| return path.get(i.saturating_add(1)..).unwrap_or("")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(user: &[&str]) -> ExcludeRules {
        let user: Vec<String> = user.iter().map(|s| s.to_string()).collect();
        return ExcludeRules::with_user_rules(&user);
    }

    #[test]
    fn any_depth_prefix_matches_nested_components() {
        let r = rules(&[]);
        assert!(r.is_excluded("node_modules"));
        assert!(r.is_excluded("node_modules/left-pad/index.js"));
        assert!(r.is_excluded("web/app/node_modules/x.js"));
        assert!(r.is_excluded("pkg/__pycache__"));
        assert!(!r.is_excluded("src/node_modules_helper.py"));
    }

    #[test]
    fn any_depth_file_globs() {
        let r = rules(&[]);
        assert!(r.is_excluded("server.log"));
        assert!(r.is_excluded("logs/deep/server.log"));
        assert!(r.is_excluded("config/.env"));
        assert!(!r.is_excluded("src/logging.py"));
    }

    #[test]
    fn subtree_suffix_matches_directory_and_contents() {
        let r = rules(&["generated/**"]);
        assert!(r.is_excluded("generated"));
        assert!(r.is_excluded("generated/a/b.rs"));
        assert!(!r.is_excluded("src/generated/a.rs"));
        assert!(!r.is_excluded("generated_docs/a.md"));
    }

    #[test]
    fn plain_glob_does_not_cross_separators() {
        let r = rules(&["*.tmp"]);
        assert!(r.is_excluded("scratch.tmp"));
        assert!(!r.is_excluded("nested/scratch.tmp"));
    }

    #[test]
    fn user_rules_extend_defaults() {
        let r = rules(&["docs/_build/**"]);
        assert!(r.is_excluded(".git/HEAD"));
        assert!(r.is_excluded("docs/_build/index.html"));
        assert_eq!(r.patterns().last().map(String::as_str), Some("docs/_build/**"));
    }

    #[test]
    fn invalid_user_rule_is_ignored() {
        let r = rules(&["src/[broken"]);
        assert_eq!(r.patterns().len(), DEFAULT_EXCLUDES.len());
    }

    #[test]
    fn state_directory_is_always_excluded() {
        assert!(ExcludeRules::defaults().is_excluded(".driftline/memory/repo-baseline.json"));
    }
}
