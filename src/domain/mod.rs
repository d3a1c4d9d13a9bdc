//! Domain types and pure validation logic
//!
//! Nothing in here touches axum, tokio or the filesystem.

pub mod operation;
pub mod validate;

// Re-exports for convenience
pub use operation::{CommandSpec, ExecOutcome, ExecutionResult, Operation};
pub use validate::{validate, CommandKind, ValidationError};
