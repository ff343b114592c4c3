//! Isolated worker execution for conversions.
//!
//! Each conversion runs in a child process that is torn down afterwards,
//! so memory is returned to the OS no matter what the conversion library
//! leaked or fragmented internally. The child is this same executable
//! re-invoked with a hidden subcommand; the parent enforces a hard
//! wall-clock budget and kills the child when it expires. A timeout and a
//! crash are distinct, separately reportable failure kinds.

use std::path::Path;
use std::time::Duration;

use crate::ConvertError;

/// Default wall-clock budget for one conversion.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Hidden subcommand the binary wires to [`crate::convert_file`].
pub const WORKER_SUBCOMMAND: &str = "convert-worker";

/// Runs one conversion in an isolated child process.
///
/// Re-invokes the current executable with [`WORKER_SUBCOMMAND`], waits up
/// to `timeout`, and kills the child on expiry.
///
/// # Errors
///
/// Returns [`ConvertError::Timeout`] when the budget is exceeded,
/// [`ConvertError::WorkerFailed`] when the child exits unsuccessfully, and
/// [`ConvertError::Io`] when the child cannot be spawned.
pub async fn run_isolated(
    input: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<(), ConvertError> {
    let exe = std::env::current_exe()?;
    let mut command = tokio::process::Command::new(exe);
    command.arg(WORKER_SUBCOMMAND).arg(input).arg(output);
    run_to_completion(command, timeout).await
}

/// Spawns a command and enforces the wall-clock budget.
async fn run_to_completion(
    mut command: tokio::process::Command,
    timeout: Duration,
) -> Result<(), ConvertError> {
    let mut child = command.spawn()?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Err(_elapsed) => {
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill timed-out conversion worker: {e}");
            }
            Err(ConvertError::Timeout {
                limit_secs: timeout.as_secs(),
            })
        }
        Ok(Err(e)) => Err(ConvertError::Io(e)),
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(ConvertError::WorkerFailed {
            code: status.code(),
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_worker_completes() {
        let command = tokio::process::Command::new("true");
        run_to_completion(command, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn crash_reports_exit_code() {
        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg("exit 3");

        let err = run_to_completion(command, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::WorkerFailed { code: Some(3) }
        ));
        assert_eq!(err.kind(), "ConversionFailed");
    }

    #[tokio::test]
    async fn timeout_kills_the_worker() {
        let mut command = tokio::process::Command::new("sleep");
        command.arg("5");

        let err = run_to_completion(command, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Timeout { .. }));
        assert_eq!(err.kind(), "ConversionTimeout");
    }
}
