//! Configuration module
//!
//! Environment variable parsing and fixed operational constants

pub mod env;

pub use env::constants;
pub use env::EnvConfig;
