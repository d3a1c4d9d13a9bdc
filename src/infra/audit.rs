//! Append-only audit log
//!
//! One JSON record per line, flushed on every append so a crashed or
//! timed-out operation still leaves a trail up to its last completed step.
//! Rotation and retention belong to the host, not the agent.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

/// One audited event: a received request, a pipeline stage, or a terminal
/// request outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    pub fn new(operation: &str, target: Option<&str>, outcome: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            target: target.map(str::to_string),
            outcome: outcome.to_string(),
            detail: None,
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Shared audit sink. Appends are serialized through a single writer lock.
pub struct AuditLog {
    writer: Mutex<File>,
}

impl AuditLog {
    /// Open (or create) the log file for appending.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(file),
        })
    }

    /// Append one record and flush. A failed write is reported via tracing
    /// but never fails the request that produced it.
    pub fn append(&self, record: AuditRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to serialize audit record");
                return;
            }
        };

        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
            error!(error = %e, "Failed to append audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).unwrap();

        log.append(AuditRecord::new("restart-service", Some("nginx"), "success"));
        log.append(
            AuditRecord::new("install-package", Some("netcat"), "rejected")
                .detail("Package 'netcat' is not permitted"),
        );

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.operation, "restart-service");
        assert_eq!(first.target.as_deref(), Some("nginx"));
        assert_eq!(first.outcome, "success");
        assert!(first.detail.is_none());

        let second: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.outcome, "rejected");
        assert!(second.detail.unwrap().contains("not permitted"));
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.log");
        let log = AuditLog::open(&path).unwrap();
        log.append(AuditRecord::new("health", None, "healthy"));
        assert!(path.exists());
    }
}
