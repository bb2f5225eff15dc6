//! CLI command implementations

pub mod config;
pub mod tables;
pub mod watch;
