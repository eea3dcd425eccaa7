// ABOUTME: Deploy command implementation.
// ABOUTME: Connects (or plans with a dry-run executor) and runs one deploy.

use super::connection::{connect, disconnect, emit_warnings};
use shipnode::config::{Config, local_user};
use shipnode::deploy::{DeployOptions, DeployVariant, SourceTree};
use shipnode::diagnostics::Diagnostics;
use shipnode::error::Result;
use shipnode::output::Output;
use shipnode::remote::DryRun;
use std::path::Path;

pub struct DeployFlags {
    pub dry_run: bool,
    pub skip_build: bool,
    pub force: bool,
}

pub async fn deploy(
    config: Config,
    project_dir: &Path,
    flags: DeployFlags,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();

    let mut options = DeployOptions::new(
        SourceTree::new(project_dir).skip_build(flags.skip_build),
        local_user(),
    );
    options.force = flags.force;
    options.dry_run = flags.dry_run;

    output.progress(&format!(
        "Deploying {} ({}) to {}:{}",
        config.app,
        DeployVariant::for_config(&config),
        config.server.host,
        config.remote_root()
    ));

    if flags.dry_run {
        let dry = DryRun::new();
        let result = shipnode::deploy::deploy(&dry, &config, &options, &mut diag).await;
        output.plan(&dry.plan());
        emit_warnings(&output, &diag);
        result?;
        output.success("Dry run complete, nothing was changed");
        return Ok(());
    }

    let exec = connect(&config, &output).await?;
    let result = shipnode::deploy::deploy(&exec, &config, &options, &mut diag).await;
    disconnect(exec, &config, &mut diag).await;
    emit_warnings(&output, &diag);

    let report = result?;
    output.data("deploy", &report);
    if !report.removed.is_empty() {
        output.progress(&format!(
            "  → Removed {} old release(s)",
            report.removed.len()
        ));
    }
    match &report.release {
        Some(id) => output.success(&format!("Deployed {} release {}", config.app, id)),
        None => output.success(&format!("Deployed {}", config.app)),
    }
    Ok(())
}
