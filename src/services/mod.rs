//! Service layer
//!
//! Core control-plane logic: systemd operations and the update pipeline.

pub mod systemd;
pub mod update;
