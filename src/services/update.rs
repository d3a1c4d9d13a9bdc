//! Update pipeline
//!
//! Fixed stage sequence with fail-fast abort: fetch, backup, dependencies,
//! migrate, restart, health-check. Exactly one pipeline may run at a time;
//! a second concurrent request is rejected immediately rather than queued.
//! Every stage transition is appended to the audit log before the next
//! stage begins, so a crash mid-pipeline still leaves a trail.

use std::time::Duration;

use thiserror::Error;

use crate::config::constants::LONG_TIMEOUT_SECS;
use crate::domain::{validate, CommandKind, CommandSpec, ExecutionResult};
use crate::infra::AuditRecord;
use crate::state::AppState;

/// One discrete, independently failable step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Backup,
    Dependencies,
    Migrate,
    Restart,
    HealthCheck,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Backup => "backup",
            Stage::Dependencies => "dependencies",
            Stage::Migrate => "migrate",
            Stage::Restart => "restart",
            Stage::HealthCheck => "health_check",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal success states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated { revision: String },
    /// Fetch reported nothing new and the caller did not force.
    AlreadyUpToDate,
}

/// Terminal failure states.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpdateError {
    #[error("Update already in progress")]
    InProgress,
    #[error("Update stage '{stage}' failed: {reason}")]
    Stage { stage: Stage, reason: String },
}

/// Run the pipeline to a terminal state.
pub async fn run(state: &AppState, force: bool) -> Result<UpdateOutcome, UpdateError> {
    let _guard = state
        .update_lock
        .try_lock()
        .map_err(|_| UpdateError::InProgress)?;

    let config = &state.config;
    tracing::info!(force, app_dir = %config.app_dir.display(), "Starting update pipeline");

    // Stage 1: fetch latest code as the application's own account.
    let fetch = run_stage(
        state,
        Stage::Fetch,
        CommandSpec::new(
            "git",
            &["-C", &config.app_dir.to_string_lossy(), "pull", "--ff-only"],
            Duration::from_secs(LONG_TIMEOUT_SECS),
        )
        .run_as(config.app_user.as_str()),
    )
    .await?;

    if !force && already_up_to_date(&fetch.stdout_tail) {
        tracing::info!("Working tree already up to date, skipping remaining stages");
        state
            .audit
            .append(AuditRecord::new("update-stage", Some("fetch"), "no-op"));
        return Ok(UpdateOutcome::AlreadyUpToDate);
    }

    // Stage 2: database backup. A failed backup is audited but does not
    // abort the update.
    let backup_spec = CommandSpec::new(
        config.venv_bin("python").to_string_lossy(),
        &["-m", "flask", "backup-db"],
        Duration::from_secs(LONG_TIMEOUT_SECS),
    )
    .cwd(&config.app_dir)
    .env("FLASK_APP", "run.py")
    .run_as(config.app_user.as_str());
    let backup = state.executor.execute(&backup_spec).await;
    if backup.success() {
        state
            .audit
            .append(AuditRecord::new("update-stage", Some("backup"), "success"));
    } else {
        tracing::warn!(reason = %backup.failure_reason(), "Database backup failed, continuing");
        state.audit.append(
            AuditRecord::new("update-stage", Some("backup"), "failure")
                .detail(backup.failure_reason()),
        );
    }

    // Stage 3: dependency install inside the virtualenv.
    run_stage(
        state,
        Stage::Dependencies,
        CommandSpec::new(
            config.venv_bin("pip").to_string_lossy(),
            &["install", "-r", "requirements/main.txt"],
            Duration::from_secs(LONG_TIMEOUT_SECS),
        )
        .cwd(&config.app_dir)
        .run_as(config.app_user.as_str()),
    )
    .await?;

    // Stage 4: schema migrations.
    run_stage(
        state,
        Stage::Migrate,
        CommandSpec::new(
            config.venv_bin("python").to_string_lossy(),
            &["-m", "flask", "apply-migrations"],
            Duration::from_secs(LONG_TIMEOUT_SECS),
        )
        .cwd(&config.app_dir)
        .env("FLASK_APP", "run.py")
        .run_as(config.app_user.as_str()),
    )
    .await?;

    // Stage 5: restart the application service (elevated). The template
    // comes from the validator so every elevated invocation shares one
    // definition.
    let restart_spec = validate(CommandKind::RestartService, &config.app_service, config)
        .map_err(|e| UpdateError::Stage {
            stage: Stage::Restart,
            reason: e.to_string(),
        })?;
    run_stage(state, Stage::Restart, restart_spec).await?;

    // Stage 6: settle, then confirm the service actually came back.
    tokio::time::sleep(Duration::from_secs(config.settle_delay_secs)).await;
    let active_spec = validate(CommandKind::ServiceActive, &config.app_service, config)
        .map_err(|e| UpdateError::Stage {
            stage: Stage::HealthCheck,
            reason: e.to_string(),
        })?;
    let health = state.executor.execute(&active_spec).await;
    if health.stdout_tail.trim() != "active" {
        let err = UpdateError::Stage {
            stage: Stage::HealthCheck,
            reason: "service not running after update".to_string(),
        };
        state.audit.append(
            AuditRecord::new("update-stage", Some(Stage::HealthCheck.as_str()), "failure")
                .detail("service not running after update"),
        );
        return Err(err);
    }
    state.audit.append(AuditRecord::new(
        "update-stage",
        Some(Stage::HealthCheck.as_str()),
        "success",
    ));

    let revision = current_revision(state).await;
    tracing::info!(revision = %revision, "Update pipeline completed");
    Ok(UpdateOutcome::Updated { revision })
}

/// Execute one fail-fast stage, auditing its transition either way.
async fn run_stage(
    state: &AppState,
    stage: Stage,
    spec: CommandSpec,
) -> Result<ExecutionResult, UpdateError> {
    tracing::info!(stage = %stage, command = %spec.display(), "Running update stage");
    let result = state.executor.execute(&spec).await;

    if result.success() {
        state
            .audit
            .append(AuditRecord::new("update-stage", Some(stage.as_str()), "success"));
        Ok(result)
    } else {
        let reason = result.failure_reason();
        tracing::error!(stage = %stage, reason = %reason, "Update stage failed");
        state.audit.append(
            AuditRecord::new("update-stage", Some(stage.as_str()), "failure")
                .detail(reason.clone()),
        );
        Err(UpdateError::Stage { stage, reason })
    }
}

/// Both spellings git has used over the years.
fn already_up_to_date(stdout: &str) -> bool {
    stdout.contains("Already up to date") || stdout.contains("Already up-to-date")
}

/// Short revision of the working tree, for response details. Failure here
/// never fails the surrounding operation.
pub async fn current_revision(state: &AppState) -> String {
    let spec = CommandSpec::new(
        "git",
        &[
            "-C",
            &state.config.app_dir.to_string_lossy(),
            "rev-parse",
            "--short",
            "HEAD",
        ],
        Duration::from_secs(10),
    )
    .run_as(state.config.app_user.as_str());

    let result = state.executor.execute(&spec).await;
    if result.success() {
        result.stdout_tail.trim().to_string()
    } else {
        "unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::infra::command::stub::{failed_result, ok_result, StubExecutor};

    /// Stub that answers like a healthy host: fetch pulls new commits,
    /// every stage succeeds, the service comes back active.
    fn healthy_executor() -> StubExecutor {
        StubExecutor::new(|spec| {
            if spec.args.contains(&"pull".to_string()) {
                ok_result("Updating 1ac2f3..9bd471\nFast-forward\n")
            } else if spec.args.contains(&"is-active".to_string()) {
                ok_result("active\n")
            } else if spec.args.contains(&"rev-parse".to_string()) {
                ok_result("9bd471a\n")
            } else {
                ok_result("")
            }
        })
    }

    #[tokio::test]
    async fn test_full_pipeline_reports_revision() {
        let executor = Arc::new(healthy_executor());
        let (state, _dir, _path) = AppState::for_tests(executor.clone());

        let outcome = run(&state, false).await.unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Updated {
                revision: "9bd471a".to_string()
            }
        );

        // fetch, backup, pip, migrate, restart, is-active, rev-parse
        assert_eq!(executor.call_count(), 7);
    }

    #[tokio::test]
    async fn test_noop_fetch_short_circuits() {
        let executor = Arc::new(StubExecutor::new(|spec| {
            if spec.args.contains(&"pull".to_string()) {
                ok_result("Already up to date.\n")
            } else {
                panic!("no stage after fetch should run: {:?}", spec.args)
            }
        }));
        let (state, _dir, _path) = AppState::for_tests(executor.clone());

        let outcome = run(&state, false).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::AlreadyUpToDate);
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_force_bypasses_short_circuit() {
        let executor = Arc::new(StubExecutor::new(|spec| {
            if spec.args.contains(&"pull".to_string()) {
                ok_result("Already up to date.\n")
            } else if spec.args.contains(&"is-active".to_string()) {
                ok_result("active\n")
            } else if spec.args.contains(&"rev-parse".to_string()) {
                ok_result("1ac2f3b\n")
            } else {
                ok_result("")
            }
        }));
        let (state, _dir, _path) = AppState::for_tests(executor.clone());

        let outcome = run(&state, true).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Updated { .. }));
        assert!(executor.call_count() > 1);
    }

    #[tokio::test]
    async fn test_migration_failure_never_restarts() {
        let executor = Arc::new(StubExecutor::new(|spec| {
            if spec.args.contains(&"apply-migrations".to_string()) {
                failed_result("alembic: target database is not up to date")
            } else if spec.args.contains(&"pull".to_string()) {
                ok_result("Fast-forward\n")
            } else {
                ok_result("")
            }
        }));
        let (state, _dir, audit_path) = AppState::for_tests(executor.clone());

        let err = run(&state, false).await.unwrap_err();
        match &err {
            UpdateError::Stage { stage, reason } => {
                assert_eq!(*stage, Stage::Migrate);
                assert!(reason.contains("alembic"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("migrate"));

        // The restart stage was never reached.
        let restarted = executor
            .calls()
            .iter()
            .any(|spec| spec.args.first().map(String::as_str) == Some("restart"));
        assert!(!restarted);

        // The failed stage left an audit trail.
        let audit = std::fs::read_to_string(&audit_path).unwrap();
        assert!(audit.contains("migrate"));
        assert!(audit.contains("failure"));
    }

    #[tokio::test]
    async fn test_health_check_failure_is_distinct_from_restart_failure() {
        let executor = Arc::new(StubExecutor::new(|spec| {
            if spec.args.contains(&"is-active".to_string()) {
                let mut r = failed_result("");
                r.stdout_tail = "inactive\n".to_string();
                r
            } else if spec.args.contains(&"pull".to_string()) {
                ok_result("Fast-forward\n")
            } else {
                ok_result("")
            }
        }));
        let (state, _dir, _path) = AppState::for_tests(executor);

        let err = run(&state, false).await.unwrap_err();
        assert_eq!(
            err,
            UpdateError::Stage {
                stage: Stage::HealthCheck,
                reason: "service not running after update".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_update_rejected() {
        let executor = Arc::new(healthy_executor());
        let (state, _dir, _path) = AppState::for_tests(executor.clone());

        let guard = state.update_lock.try_lock().unwrap();
        let err = run(&state, false).await.unwrap_err();
        assert_eq!(err, UpdateError::InProgress);
        // The rejected run never reached stage 1.
        assert_eq!(executor.call_count(), 0);
        drop(guard);

        // With the lock released the pipeline runs normally.
        assert!(run(&state, false).await.is_ok());
    }
}
