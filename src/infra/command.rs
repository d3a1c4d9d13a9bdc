//! Operation executor
//!
//! Runs one approved command to completion with a bounded wall-clock
//! timeout. Elevation (`sudo -n`) and account drops (`sudo -n -u <user>`)
//! are expressed only through [`CommandSpec`], so every invocation that
//! crosses the privilege boundary is visible at its validator or pipeline
//! call site.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::config::constants::OUTPUT_TAIL_BYTES;
use crate::domain::{CommandSpec, ExecOutcome, ExecutionResult};

/// Seam between handlers/pipeline and the operating system.
///
/// Tests substitute a recording stub so routing and pipeline logic can be
/// verified without spawning processes.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, spec: &CommandSpec) -> ExecutionResult;
}

/// The real executor: spawns via `tokio::process`, kills on timeout.
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute(&self, spec: &CommandSpec) -> ExecutionResult {
        let started = Instant::now();
        debug!(command = %spec.display(), elevate = spec.elevate, "Executing command");

        let mut cmd = build_command(spec);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(command = %spec.display(), error = %e, "Failed to spawn command");
                return ExecutionResult {
                    outcome: ExecOutcome::LaunchFailed,
                    exit_code: None,
                    stdout_tail: String::new(),
                    stderr_tail: e.to_string(),
                    duration: started.elapsed(),
                };
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = tokio::spawn(read_all(stdout));
        let stderr_task = tokio::spawn(read_all(stderr));

        let (status, timed_out) = tokio::select! {
            status = child.wait() => (status, false),
            _ = tokio::time::sleep(spec.timeout) => {
                warn!(command = %spec.display(), timeout = ?spec.timeout, "Command timed out, killing process");
                let _ = child.kill().await;
                (child.wait().await, true)
            }
        };

        let stdout_tail = tail(stdout_task.await.unwrap_or_default());
        let stderr_tail = tail(stderr_task.await.unwrap_or_default());
        let duration = started.elapsed();

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                error!(command = %spec.display(), error = %e, "Failed to wait for command");
                return ExecutionResult {
                    outcome: ExecOutcome::LaunchFailed,
                    exit_code: None,
                    stdout_tail,
                    stderr_tail: e.to_string(),
                    duration,
                };
            }
        };

        let outcome = if timed_out {
            ExecOutcome::TimedOut
        } else if status.success() {
            ExecOutcome::Success
        } else if elevation_denied(spec, &stderr_tail) {
            ExecOutcome::ElevationDenied
        } else {
            ExecOutcome::Failed
        };

        ExecutionResult {
            outcome,
            exit_code: status.code(),
            stdout_tail,
            stderr_tail,
            duration,
        }
    }
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = if let Some(user) = &spec.run_as {
        let mut cmd = Command::new("sudo");
        cmd.arg("-n").arg("-u").arg(user).arg(&spec.program);
        cmd
    } else if spec.elevate {
        let mut cmd = Command::new("sudo");
        cmd.arg("-n").arg(&spec.program);
        cmd
    } else {
        Command::new(&spec.program)
    };

    cmd.args(&spec.args);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// `sudo -n` refusing is a distinct outcome from the command failing.
fn elevation_denied(spec: &CommandSpec, stderr: &str) -> bool {
    (spec.elevate || spec.run_as.is_some())
        && stderr.contains("sudo:")
        && (stderr.contains("password is required") || stderr.contains("not allowed"))
}

async fn read_all<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}

/// Keep only the last `OUTPUT_TAIL_BYTES` of output, on a char boundary.
fn tail(bytes: Vec<u8>) -> String {
    let text = String::from_utf8_lossy(&bytes);
    if text.len() <= OUTPUT_TAIL_BYTES {
        return text.into_owned();
    }
    let mut start = text.len() - OUTPUT_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_execute_success() {
        let spec = CommandSpec::new("echo", &["hello"], Duration::from_secs(5));
        let result = SystemExecutor.execute(&spec).await;
        assert!(result.success());
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout_tail.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_nonzero_exit() {
        let spec = CommandSpec::new("false", &[], Duration::from_secs(5));
        let result = SystemExecutor.execute(&spec).await;
        assert_eq!(result.outcome, ExecOutcome::Failed);
        assert_eq!(result.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_execute_launch_failure() {
        let spec = CommandSpec::new("nonexistent-command-44721", &[], Duration::from_secs(5));
        let result = SystemExecutor.execute(&spec).await;
        assert_eq!(result.outcome, ExecOutcome::LaunchFailed);
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn test_execute_timeout_kills_process() {
        let spec = CommandSpec::new("sleep", &["30"], Duration::from_millis(100));
        let started = Instant::now();
        let result = SystemExecutor.execute(&spec).await;
        assert_eq!(result.outcome, ExecOutcome::TimedOut);
        // The process must actually be killed, not left running for 30s.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_tail_truncates_long_output() {
        let long = "x".repeat(OUTPUT_TAIL_BYTES * 2);
        let tailed = tail(long.into_bytes());
        assert_eq!(tailed.len(), OUTPUT_TAIL_BYTES);
    }

    #[test]
    fn test_elevation_denied_detection() {
        let spec = CommandSpec::new("systemctl", &["restart", "bayanat"], Duration::from_secs(5))
            .elevated();
        assert!(elevation_denied(&spec, "sudo: a password is required"));
        assert!(!elevation_denied(&spec, "Job for bayanat.service failed"));

        let plain = CommandSpec::new("systemctl", &["is-active", "nginx"], Duration::from_secs(5));
        assert!(!elevation_denied(&plain, "sudo: a password is required"));
    }
}
