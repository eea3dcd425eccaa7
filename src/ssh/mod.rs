// ABOUTME: SSH transport for remote steps: one russh session per invocation.
// ABOUTME: Host key policy, credential selection, and command execution live in submodules.

mod auth;
mod error;
mod host_keys;
mod session;

pub use error::{Error, Result};
pub use session::{CommandOutput, Session, SessionConfig};
