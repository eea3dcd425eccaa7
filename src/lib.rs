// ABOUTME: Library root for shipnode - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod hooks;
pub mod output;
pub mod release;
pub mod remote;
pub mod ssh;
pub mod types;
