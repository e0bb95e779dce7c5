//! Child process execution with captured output

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// Captured result of an external tool run
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last non-empty stderr line, the usual place for a tool's diagnostic
    pub fn diagnostic(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exit status {}", self.status))
    }
}

/// Render a command line for logs
pub fn describe(command: &Command) -> String {
    let std = command.as_std();
    let mut parts = vec![std.get_program().to_string_lossy().to_string()];
    parts.extend(std.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Run to completion, capturing stdout and stderr. The child is killed when the
/// limit elapses or the future is dropped.
pub async fn capture(mut command: Command, limit: Option<Duration>) -> io::Result<ToolOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!("Running: {}", describe(&command));

    let child = command.spawn()?;
    let wait = child.wait_with_output();
    let output = match limit {
        Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("process did not finish within {:?}", limit),
            )
        })??,
        None => wait.await?,
    };

    Ok(ToolOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_collects_both_streams() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = capture(command, None).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.diagnostic(), "err");
    }

    #[tokio::test]
    async fn test_capture_times_out() {
        let mut command = Command::new("sh");
        command.args(["-c", "sleep 5"]);
        let err = capture(command, Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
