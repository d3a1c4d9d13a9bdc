//! Application state

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::EnvConfig;
use crate::infra::{AuditLog, CommandExecutor};

/// Shared state behind every request handler.
///
/// The only mutable pieces are the audit sink (internally locked) and the
/// update lock; everything else is read-only after startup.
pub struct AppState {
    /// Agent configuration
    pub config: EnvConfig,
    /// Executor seam; tests substitute a recording stub
    pub executor: Arc<dyn CommandExecutor>,
    /// Append-only audit sink
    pub audit: AuditLog,
    /// Exclusive, non-reentrant update lock. `try_lock` failure means an
    /// update pipeline is mid-flight and the request must be rejected, not
    /// queued.
    pub update_lock: Mutex<()>,
    /// Agent start time
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: EnvConfig, executor: Arc<dyn CommandExecutor>, audit: AuditLog) -> Self {
        Self {
            config,
            executor,
            audit,
            update_lock: Mutex::new(()),
            started_at: Utc::now(),
        }
    }

    /// State backed by a temp audit file; returns the tempdir so it lives
    /// as long as the test.
    #[cfg(test)]
    pub fn for_tests(
        executor: Arc<dyn CommandExecutor>,
    ) -> (Arc<Self>, tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let audit_path = dir.path().join("audit.log");
        let audit = AuditLog::open(&audit_path).expect("audit log");
        let state = Arc::new(Self::new(EnvConfig::for_tests(), executor, audit));
        (state, dir, audit_path)
    }
}
