//! Child process helpers shared by the worker invoker and readiness probes.

use tokio::process::Child;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// Extract an exit code from an `ExitStatus`.
///
/// On Unix a signal-terminated worker reports 128 + signal number, matching
/// shell convention, so callers always see a single integer.
pub(crate) fn exit_code(status: &std::process::ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        if let Some(signal) = status.signal() {
            return Some(128 + signal);
        }
    }
    None
}

/// Kill a child process and wait for it so no zombie is left behind.
///
/// Returns the exit code if the child could be reaped.
pub(crate) async fn kill_and_reap(child: &mut Child) -> Option<i32> {
    let _ = child.kill().await;
    match child.wait().await {
        Ok(status) => exit_code(&status),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_passthrough() {
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("exit 42")
            .status()
            .await
            .expect("failed to run sh");

        assert_eq!(exit_code(&status), Some(42));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_success() {
        let status = tokio::process::Command::new("true")
            .status()
            .await
            .expect("failed to run true");

        assert_eq!(exit_code(&status), Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_and_reap_reports_signal() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("failed to spawn sleep");

        let code = kill_and_reap(&mut child).await;
        // SIGKILL (9) -> 128 + 9
        assert_eq!(code, Some(137));
    }
}
