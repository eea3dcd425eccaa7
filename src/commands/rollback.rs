// ABOUTME: Rollback command implementation.
// ABOUTME: Switches current back N successful releases on the configured server.

use super::connection::{connect, disconnect, emit_warnings};
use shipnode::config::{Config, local_user};
use shipnode::deploy::DeployError;
use shipnode::diagnostics::Diagnostics;
use shipnode::error::Result;
use shipnode::output::Output;

pub async fn rollback(config: Config, steps: usize, mut output: Output) -> Result<()> {
    output.start_timer();
    if !config.zero_downtime {
        return Err(DeployError::Config(
            "rollback needs release directories; set zero_downtime: true and run migrate"
                .to_string(),
        )
        .into());
    }
    let mut diag = Diagnostics::default();

    output.progress(&format!(
        "Rolling back {} on {} ({} release(s))",
        config.app, config.server.host, steps
    ));

    let exec = connect(&config, &output).await?;
    let result =
        shipnode::deploy::rollback(&exec, &config, steps, &local_user(), &mut diag).await;
    disconnect(exec, &config, &mut diag).await;
    emit_warnings(&output, &diag);

    let report = result?;
    output.data("rollback", &report);
    output.success(&format!(
        "Rolled back {} from {} to {}",
        config.app, report.from, report.to
    ));
    Ok(())
}
