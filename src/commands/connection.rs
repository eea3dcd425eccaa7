// ABOUTME: Shared helpers for opening and closing the SSH executor.
// ABOUTME: Every remote command connects once and reuses the session throughout.

use shipnode::config::{Config, local_user};
use shipnode::diagnostics::{Diagnostics, Warning};
use shipnode::error::Result;
use shipnode::output::Output;
use shipnode::remote::SshExecutor;
use shipnode::ssh::Session;

pub async fn connect(config: &Config, output: &Output) -> Result<SshExecutor> {
    let server = &config.server;
    output.progress(&format!("  → Connecting to {}...", server.host));
    let session = Session::connect(server.ssh_session_config(&local_user())).await?;
    Ok(SshExecutor::new(session))
}

/// Close the session. Failure is non-fatal.
pub async fn disconnect(exec: SshExecutor, config: &Config, diag: &mut Diagnostics) {
    if let Err(e) = exec.disconnect().await {
        diag.warn(Warning::ssh_disconnect(format!(
            "SSH disconnect failed for {}: {}",
            config.server.host, e
        )));
    }
}

pub fn emit_warnings(output: &Output, diag: &Diagnostics) {
    for warning in diag.warnings() {
        output.warning(warning);
    }
}
