//! Resource governor: per-operation deadlines and hard limits.
//!
//! Operations are synchronous and cooperative. A `Deadline` token is threaded
//! through every loop that touches the filesystem and checked at each entry,
//! so an expired operation stops at its next I/O step instead of running to
//! completion.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Default per-operation deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default ceiling on files tracked by one operation.
pub const DEFAULT_MAX_FILES: usize = 10_000;

/// A cancellation token carrying an operation's start and budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    /// Allowed running time.
    limit: Duration,
    /// Name used in the timeout error.
    operation: &'static str,
    /// When the operation began.
    started: Instant,
}

impl Deadline {
    /// Fail with `TimeoutExceeded` once the budget is spent.
    ///
    /// # Errors
    ///
    /// Returns `Error::TimeoutExceeded` after the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.started.elapsed() <= self.limit {
            return Ok(());
        }
        tracing::warn!(operation = self.operation, limit_secs = self.limit.as_secs(), "deadline exceeded");
        return Err(Error::TimeoutExceeded {
            deadline: self.limit,
            guidance: timeout_guidance(),
            operation: self.operation,
        });
    }

    /// A token that never expires in practice, for callers outside the engine.
    pub fn unbounded(operation: &'static str) -> Self {
        return Self::start(operation, Duration::MAX);
    }

    /// Start the clock for `operation`.
    pub fn start(operation: &'static str, limit: Duration) -> Self {
        return Self { limit, operation, started: Instant::now() };
    }
}

/// Build the `ResourceLimitExceeded` error for a file ceiling.
pub fn file_limit_error(limit: usize) -> Error {
    return Error::ResourceLimitExceeded {
        guidance: format!(
            "Narrow the tree with `exclude` rules in .driftline.toml, or raise `max_files` above {limit} \
             if the project really tracks that many files."
        ),
        limit,
        resource: "tracked file",
    };
}

/// Run `operation` with a fresh deadline token and fail if it overran.
///
/// The token is handed to the operation so it can stop early; the final
/// check catches operations whose last step pushed them past the budget.
///
/// # Errors
///
/// Propagates the operation's own error, or `Error::TimeoutExceeded`.
pub fn run_with_deadline<T>(
    name: &'static str,
    limit: Duration,
    operation: impl FnOnce(&Deadline) -> Result<T>,
) -> Result<T> {
    let deadline = Deadline::start(name, limit);
    let value = operation(&deadline)?;
    deadline.check()?;
    return Ok(value);
}

/// Remediation text for timeouts.
fn timeout_guidance() -> String {
    return "Exclude large generated or vendored directories, or raise `timeout_secs` in .driftline.toml."
        .to_string();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_operation_returns_its_value() {
        let value = run_with_deadline("noop", Duration::from_secs(5), |_| return Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn expired_deadline_reports_timeout() {
        let err = run_with_deadline("slow", Duration::ZERO, |deadline| {
            std::thread::sleep(Duration::from_millis(5));
            deadline.check()?;
            return Ok(());
        })
        .unwrap_err();

        match err {
            Error::TimeoutExceeded { deadline, operation, guidance } => {
                assert_eq!(deadline, Duration::ZERO);
                assert_eq!(operation, "slow");
                assert!(guidance.contains("timeout_secs"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn operation_error_wins_over_timeout() {
        let err = run_with_deadline::<()>("failing", Duration::from_secs(5), |_| {
            return Err(file_limit_error(3));
        })
        .unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded { limit: 3, .. }));
    }

    #[test]
    fn unbounded_deadline_never_expires() {
        assert!(Deadline::unbounded("test").check().is_ok());
    }
}
