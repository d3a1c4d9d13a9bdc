//! Core operation types
//!
//! An [`Operation`] is constructed fresh per request and is immutable once
//! built. The validator turns an operation into a [`CommandSpec`]; the
//! executor turns a spec into an [`ExecutionResult`].

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// One requested control-plane operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    RestartService { name: String },
    ServiceStatus { name: String },
    UpdateApplication { force: bool },
    HealthCheck,
    InstallPackage { name: String },
}

impl Operation {
    /// Short name used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::RestartService { .. } => "restart-service",
            Operation::ServiceStatus { .. } => "service-status",
            Operation::UpdateApplication { .. } => "update",
            Operation::HealthCheck => "health",
            Operation::InstallPackage { .. } => "install-package",
        }
    }

    /// The target identifier, if the operation has one.
    pub fn target(&self) -> Option<&str> {
        match self {
            Operation::RestartService { name } | Operation::ServiceStatus { name } => Some(name),
            Operation::InstallPackage { name } => Some(name),
            Operation::UpdateApplication { .. } | Operation::HealthCheck => None,
        }
    }
}

/// An approved, fully concrete external invocation.
///
/// The identifier that survived validation only ever appears as a discrete
/// argv entry; nothing here is passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, if the command cares.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Run as this account via `sudo -n -u <user>` (non-privileged drop).
    pub run_as: Option<String>,
    /// Elevate via `sudo -n` (host sudoers policy decides whether to allow).
    pub elevate: bool,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str], timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
            env: Vec::new(),
            run_as: None,
            elevate: false,
            timeout,
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    pub fn elevated(mut self) -> Self {
        self.elevate = true;
        self
    }

    /// Human-readable command line for logs and audit details.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// How an executed command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecOutcome {
    /// Exited zero.
    Success,
    /// Exited non-zero (or was killed by a signal).
    Failed,
    /// Killed after exceeding the spec's timeout.
    TimedOut,
    /// `sudo -n` refused; the command itself never ran.
    ElevationDenied,
    /// The process could not be spawned at all.
    LaunchFailed,
}

/// Result of running one approved command to completion.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub outcome: ExecOutcome,
    pub exit_code: Option<i32>,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.outcome == ExecOutcome::Success
    }

    /// Best single-line explanation of a failure, preferring stderr.
    pub fn failure_reason(&self) -> String {
        match self.outcome {
            ExecOutcome::TimedOut => {
                format!("command timed out after {}s", self.duration.as_secs())
            }
            ExecOutcome::ElevationDenied => "privilege elevation denied".to_string(),
            ExecOutcome::LaunchFailed => {
                format!("failed to launch command: {}", self.stderr_tail.trim())
            }
            _ => {
                let detail = if self.stderr_tail.trim().is_empty() {
                    self.stdout_tail.trim()
                } else {
                    self.stderr_tail.trim()
                };
                if detail.is_empty() {
                    format!("exit code {:?}", self.exit_code)
                } else {
                    detail.to_string()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_kind_and_target() {
        let op = Operation::RestartService {
            name: "nginx".to_string(),
        };
        assert_eq!(op.kind(), "restart-service");
        assert_eq!(op.target(), Some("nginx"));

        let op = Operation::UpdateApplication { force: false };
        assert_eq!(op.kind(), "update");
        assert_eq!(op.target(), None);
    }

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("systemctl", &["restart", "bayanat"], Duration::from_secs(10))
            .elevated();
        assert!(spec.elevate);
        assert_eq!(spec.display(), "systemctl restart bayanat");
    }

    #[test]
    fn test_failure_reason_prefers_stderr() {
        let result = ExecutionResult {
            outcome: ExecOutcome::Failed,
            exit_code: Some(1),
            stdout_tail: "some output".to_string(),
            stderr_tail: "fatal: not a git repository".to_string(),
            duration: Duration::from_millis(20),
        };
        assert_eq!(result.failure_reason(), "fatal: not a git repository");
    }
}
