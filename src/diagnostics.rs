use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Absolute unix or windows paths preceded by a delimiter or line start.
static ABSOLUTE_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| return Regex::new(r#"(^|[\s'"`(=])((?:[A-Za-z]:[\\/]|/)[^\s'"`,;:)]*)"#).ok());

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where the caller
/// can act on it, how to fix it. Free-form text is passed through `sanitize`.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::BaselineExists { file } => render_baseline_exists(file),
        Error::BaselineNotFound { file } => render_baseline_not_found(file),
        Error::ConcurrencyError { file, waited } => format!(
            "\
# Error: Baseline Locked

`{file}` was still held after {}s.

## Fix

Wait for the other driftline run to finish. If none is running, delete the
lock file left behind by a crashed process.
",
            waited.as_secs()
        ),
        Error::ResourceLimitExceeded { guidance, limit, resource } => render_limit(resource, *limit, guidance),
        Error::TimeoutExceeded { deadline, guidance, operation } => format!(
            "\
# Error: Timeout

`{operation}` did not finish within {}s.

## Fix

{guidance}
",
            deadline.as_secs()
        ),
        _ => render_generic(e),
    };
}

/// Replace absolute filesystem paths in `message` with `<path>`.
pub fn sanitize(message: &str) -> String {
    let Some(pattern) = ABSOLUTE_PATH.as_ref() else {
        return "<message redacted>".to_string();
    };
    return pattern.replace_all(message, "${1}<path>").into_owned();
}

fn render_baseline_exists(file: &str) -> String {
    return format!(
        "\
# Error: Baseline Exists

`{file}` is already initialized.

## Fix

Refresh it in place:

    driftline update

Or start over:

    driftline init --reset
"
    );
}

fn render_baseline_not_found(file: &str) -> String {
    return format!(
        "\
# Error: Baseline Not Found

`{file}` does not exist.

## Fix

Create the baselines first:

    driftline init
"
    );
}

fn render_generic(e: &Error) -> String {
    return match e {
        Error::BoundaryViolation { path } => format!(
            "\
# Error: Outside Project Root

`{path}` resolves outside the project root and was refused.
"
        ),
        Error::Io(e) => format!(
            "\
# Error: I/O

{}
",
            sanitize(&e.to_string())
        ),
        Error::ParseFailed { file, reason } => format!(
            "\
# Error: Parse Failed

Could not parse `{file}`: {}
",
            sanitize(reason)
        ),
        Error::RecursionLimitExceeded { max_depth, path } => format!(
            "\
# Error: Symlink Chain Too Deep

Resolving `{path}` took more than {max_depth} symlink hops.

## Fix

Break the cycle, or raise `max_symlink_depth` in `.driftline.toml`.
"
        ),
        Error::RevisionInvalid { revision } => format!(
            "\
# Error: Invalid Revision

`{revision}` is not a usable revision. Use a commit, tag, or branch name.
"
        ),
        Error::SerializationError { file, reason } => format!(
            "\
# Error: Baseline Unreadable

`{file}`: {}

## Fix

Regenerate the baselines:

    driftline init --reset
",
            sanitize(reason)
        ),
        Error::TomlDe(e) => format!(
            "\
# Error: Invalid Settings

`.driftline.toml` is malformed:

{e}
"
        ),
        Error::Vcs { reason } => format!(
            "\
# Error: Git

{}
",
            sanitize(reason)
        ),
        // Already handled in render_error, but need exhaustive match.
        _ => format!(
            "\
# Error

{}
",
            sanitize(&e.to_string())
        ),
    };
}

fn render_limit(resource: &str, limit: usize, guidance: &str) -> String {
    let mut out = format!(
        "\
# Error: Limit Exceeded

More than {limit} {resource} would be tracked; nothing was written.
"
    );
    let _ = write!(out, "\n## Fix\n\n{guidance}\n");
    return out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sanitize_scrubs_absolute_paths() {
        assert_eq!(
            sanitize("fatal: cannot open /home/alice/repo/x.py: denied"),
            "fatal: cannot open <path>: denied"
        );
        assert_eq!(sanitize("see 'C:\\Users\\bob\\repo'"), "see '<path>'");
        assert_eq!(sanitize("/etc/passwd"), "<path>");
    }

    #[test]
    fn sanitize_keeps_relative_paths() {
        assert_eq!(sanitize("changed src/app.py and docs/a.md"), "changed src/app.py and docs/a.md");
    }

    #[test]
    fn limit_errors_carry_fix_section() {
        let e = crate::governor::file_limit_error(10);
        let md = render_error(&e);
        assert!(md.contains("# Error: Limit Exceeded"));
        assert!(md.contains("More than 10"));
        assert!(md.contains("## Fix"));
        assert!(md.contains("max_files"));
    }

    #[test]
    fn lock_and_baseline_errors_render_fixes() {
        let locked = Error::ConcurrencyError { file: "repo-baseline.json.lock".into(), waited: Duration::from_secs(10) };
        assert!(render_error(&locked).contains("after 10s"));

        let missing = Error::BaselineNotFound { file: "memory/symbol-baseline.json".into() };
        assert!(render_error(&missing).contains("driftline init"));
    }

    #[test]
    fn io_messages_are_sanitized() {
        let e = Error::Vcs { reason: "git diff failed: fatal: /srv/secret/repo not a repo".into() };
        let md = render_error(&e);
        assert!(!md.contains("/srv/secret"));
    }
}
