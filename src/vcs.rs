//! Git queries: baseline provenance and revision-diff mode.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::boundary::Boundary;
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::exclude::ExcludeRules;
use crate::governor::Deadline;
use crate::types::{FileChange, FileChangeType};

/// Pause between checks on a running git process.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Commit and branch recorded alongside a checksum baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsMetadata {
    /// Checked-out branch, `None` when detached or unknown.
    pub branch: Option<String>,
    /// Full commit id of `HEAD`.
    pub commit: Option<String>,
}

/// Files changed between `revision` and the working tree, restricted to the
/// boundary's root and filtered through the exclude rules.
///
/// Renames are reported as a deletion plus an addition.
///
/// # Errors
///
/// Returns `Error::RevisionInvalid` for unsafe revision strings,
/// `Error::Vcs` if git fails, or `Error::TimeoutExceeded` if git is still
/// running when the deadline passes.
pub fn changed_files_since(
    boundary: &Boundary,
    revision: &str,
    rules: &ExcludeRules,
    deadline: &Deadline,
) -> Result<Vec<FileChange>> {
    validate_revision(revision)?;
    let stdout = git(
        boundary.root(),
        &["diff", "--name-status", "--no-renames", "--relative", revision, "--"],
        deadline,
    )?;

    let mut changes: Vec<FileChange> = parse_name_status(&stdout)
        .into_iter()
        .filter(|change| return !rules.is_excluded(&change.file))
        .filter(|change| match boundary.validate(Path::new(&change.file)) {
            Err(e) => {
                tracing::debug!(file = %change.file, reason = %e, "dropping revision change outside boundary");
                return false;
            },
            Ok(_) => return true,
        })
        .collect();
    changes.sort_by(|a, b| return (&a.file, a.change_type).cmp(&(&b.file, b.change_type)));
    changes.dedup();
    return Ok(changes);
}

/// Commit and branch of the repository containing `root`, or `None` outside
/// a repository, without a usable `git`, or past the deadline.
pub fn metadata(root: &Path, deadline: &Deadline) -> Option<VcsMetadata> {
    let commit = git(root, &["rev-parse", "HEAD"], deadline).ok()?.trim().to_string();
    let branch = git(root, &["rev-parse", "--abbrev-ref", "HEAD"], deadline)
        .ok()
        .map(|b| return b.trim().to_string())
        .filter(|b| return !b.is_empty() && b != "HEAD");
    return Some(VcsMetadata { branch, commit: Some(commit).filter(|c| return !c.is_empty()) });
}

/// Parse `git diff --name-status` output into file changes.
pub fn parse_name_status(output: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();
    for line in output.lines() {
        let mut fields = line.split('\t');
        let (Some(status), Some(first)) = (fields.next(), fields.next()) else {
            continue;
        };
        let file = first.replace('\\', "/");
        match status.chars().next() {
            Some('A' | 'C') => {
                // Copies name the source first; the new file is the last field.
                let target = fields.next_back().map_or(file, |f| return f.replace('\\', "/"));
                changes.push(FileChange { change_type: FileChangeType::Added, file: target });
            },
            Some('D') => changes.push(FileChange { change_type: FileChangeType::Deleted, file }),
            Some('M' | 'T') => changes.push(FileChange { change_type: FileChangeType::Modified, file }),
            Some('R') => {
                if let Some(renamed) = fields.next() {
                    changes.push(FileChange { change_type: FileChangeType::Added, file: renamed.replace('\\', "/") });
                }
                changes.push(FileChange { change_type: FileChangeType::Deleted, file });
            },
            _ => tracing::debug!(status, "ignoring unknown git status"),
        }
    }
    return changes;
}

/// Reject revision strings git could read as options or that carry odd bytes.
///
/// # Errors
///
/// Returns `Error::RevisionInvalid` when the string is unsafe.
pub fn validate_revision(revision: &str) -> Result<()> {
    let unsafe_char = revision.chars().any(|c| return c.is_whitespace() || c.is_control());
    if revision.is_empty() || revision.starts_with('-') || unsafe_char {
        return Err(Error::RevisionInvalid { revision: revision.escape_default().to_string() });
    }
    return Ok(());
}

/// Read a child pipe to the end on its own thread so a chatty process never
/// blocks on a full pipe while it is being polled.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    return std::thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe
            && let Err(e) = pipe.read_to_end(&mut buffer)
        {
            tracing::debug!(error = %e, "child pipe read failed");
        }
        return buffer;
    });
}

/// Run `git -C root <args>` and return stdout.
///
/// # Errors
///
/// Returns `Error::Vcs` if git cannot be spawned or exits unsuccessfully,
/// or `Error::TimeoutExceeded` if the deadline passes first.
fn git(root: &Path, args: &[&str], deadline: &Deadline) -> Result<String> {
    let mut command = Command::new("git");
    command.arg("-C").arg(root).args(args);
    let (success, stdout, stderr) = run_bounded(command, deadline)?;
    if !success {
        let stderr = String::from_utf8_lossy(&stderr);
        let name = args.first().copied().unwrap_or("git");
        return Err(Error::Vcs { reason: format!("git {name} failed: {}", diagnostics::sanitize(stderr.trim())) });
    }
    return Ok(String::from_utf8_lossy(&stdout).into_owned());
}

/// Run `command` to completion or until `deadline`, whichever comes first.
/// An overrunning process is killed and reaped. Returns whether it exited
/// successfully, with its stdout and stderr.
///
/// # Errors
///
/// Returns `Error::Vcs` if the process cannot be spawned or waited on, or
/// `Error::TimeoutExceeded` once the deadline has passed.
fn run_bounded(mut command: Command, deadline: &Deadline) -> Result<(bool, Vec<u8>, Vec<u8>)> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| return Error::Vcs { reason: format!("could not run {program}: {e}") })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Err(e) => return Err(Error::Vcs { reason: format!("could not wait for {program}: {e}") }),
            Ok(Some(status)) => break status,
            Ok(None) => {},
        }
        if let Err(timeout) = deadline.check() {
            tracing::warn!(program = %program, "killing process past its deadline");
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "kill failed; process may have exited");
            }
            if let Err(e) = child.wait() {
                tracing::debug!(error = %e, "could not reap killed process");
            }
            return Err(timeout);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let collect = |handle: JoinHandle<Vec<u8>>| {
        return handle
            .join()
            .map_err(|payload| return Error::Vcs { reason: format!("{program} output reader panicked: {payload:?}") });
    };
    let stdout = collect(stdout)?;
    let stderr = collect(stderr)?;
    return Ok((status.success(), stdout, stderr));
}
