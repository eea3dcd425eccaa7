// ABOUTME: Maintenance commands: migrate and unlock.
// ABOUTME: Migrate converts a legacy root; unlock clears a lock left by a crashed run.

use super::connection::{connect, disconnect, emit_warnings};
use shipnode::config::{Config, local_user};
use shipnode::deploy::{MigrateOutcome, force_unlock};
use shipnode::diagnostics::Diagnostics;
use shipnode::error::Result;
use shipnode::output::Output;
use shipnode::release::RemoteLayout;

pub async fn migrate(config: Config, mut output: Output) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();

    let exec = connect(&config, &output).await?;
    let result = shipnode::deploy::migrate(&exec, &config, &local_user(), &mut diag).await;
    disconnect(exec, &config, &mut diag).await;
    emit_warnings(&output, &diag);

    let outcome = result?;
    output.data("migrate", &outcome);
    match outcome {
        MigrateOutcome::Migrated(id) => {
            output.success(&format!("Migrated {} into release {}", config.remote_root(), id))
        }
        MigrateOutcome::AlreadyMigrated => {
            output.success(&format!("{} already uses releases", config.remote_root()))
        }
        MigrateOutcome::NothingToMigrate => {
            output.success(&format!("Nothing to migrate in {}", config.remote_root()))
        }
    }
    Ok(())
}

pub async fn unlock(config: Config, output: Output) -> Result<()> {
    let mut diag = Diagnostics::default();

    let exec = connect(&config, &output).await?;
    let result = force_unlock(&exec, &RemoteLayout::new(config.remote_root())).await;
    disconnect(exec, &config, &mut diag).await;
    emit_warnings(&output, &diag);

    match result? {
        Some(holder) => {
            output.data("unlock", &holder);
            output.success(&format!(
                "Removed lock held by {}@{} (pid {}, '{}') since {}",
                holder.user,
                holder.holder,
                holder.pid,
                holder.command,
                holder.started_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        None => output.success("No deploy lock was held"),
    }
    Ok(())
}
