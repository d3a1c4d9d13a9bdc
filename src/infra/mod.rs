//! Infrastructure module
//!
//! Wraps the outside world: process execution and the audit log file.

pub mod audit;
pub mod command;

pub use audit::{AuditLog, AuditRecord};
pub use command::{CommandExecutor, SystemExecutor};
