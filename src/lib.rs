// ABOUTME: Library root for wharf - exposes public types for the binary and tests.
// ABOUTME: The main binary is in main.rs.

pub mod approval;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod hooks;
pub mod output;
pub mod registry;
pub mod runner;
pub mod store;
pub mod strategy;
pub mod types;
