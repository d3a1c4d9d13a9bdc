//! Bayanat control-plane agent
//!
//! A small, loopback-only daemon that performs the privileged operations
//! the Bayanat web application cannot do itself: restarting managed
//! services, applying code updates, and installing vetted packages. Every
//! operation passes an allow-list validator and leaves an audit trail.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod server;
pub mod services;
pub mod state;
