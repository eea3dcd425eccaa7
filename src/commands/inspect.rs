// ABOUTME: Read-only commands: releases and status.
// ABOUTME: They never take the deploy lock.

use serde::Serialize;

use super::connection::{connect, disconnect, emit_warnings};
use shipnode::config::Config;
use shipnode::deploy::{DeployVariant, LockInfo, read_lock};
use shipnode::diagnostics::Diagnostics;
use shipnode::error::Result;
use shipnode::output::Output;
use shipnode::release::{LedgerAction, LedgerEntry, ReleaseStore, RemoteLayout};
use shipnode::types::ReleaseId;

/// Ledger entries shown by `status`.
const RECENT_ENTRIES: usize = 5;

pub async fn releases(config: Config, output: Output) -> Result<()> {
    let mut diag = Diagnostics::default();
    let exec = connect(&config, &output).await?;
    let rows = ReleaseStore::new(&exec, RemoteLayout::new(config.remote_root()))
        .release_rows()
        .await;
    disconnect(exec, &config, &mut diag).await;
    emit_warnings(&output, &diag);

    let rows = rows?;
    output.data("releases", &rows);

    if rows.is_empty() {
        output.line("No releases found");
        return Ok(());
    }
    for row in &rows {
        let status = row
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let marker = if row.current { "*" } else { " " };
        output.line(&format!("{} {}  {}", marker, row.id, status));
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    app: String,
    variant: String,
    current: Option<ReleaseId>,
    recent: Vec<LedgerEntry>,
    lock: Option<LockInfo>,
}

async fn gather(
    exec: &shipnode::remote::SshExecutor,
    config: &Config,
) -> Result<StatusReport> {
    let layout = RemoteLayout::new(config.remote_root());
    let store = ReleaseStore::new(exec, layout.clone());

    let current = store.current_release().await?;
    let ledger = store.read_ledger().await?;
    let lock = read_lock(exec, &layout).await?;

    let skip = ledger.entries().len().saturating_sub(RECENT_ENTRIES);
    Ok(StatusReport {
        app: config.app.to_string(),
        variant: DeployVariant::for_config(config).to_string(),
        current,
        recent: ledger.entries()[skip..].to_vec(),
        lock,
    })
}

pub async fn status(config: Config, output: Output) -> Result<()> {
    let mut diag = Diagnostics::default();
    let exec = connect(&config, &output).await?;
    let report = gather(&exec, &config).await;
    disconnect(exec, &config, &mut diag).await;
    emit_warnings(&output, &diag);

    let report = report?;
    output.data("status", &report);

    output.line(&format!("App: {} ({})", report.app, report.variant));
    output.line(&format!(
        "Current: {}",
        report
            .current
            .as_ref()
            .map_or("none".to_string(), |id| id.to_string())
    ));
    match &report.lock {
        Some(lock) => output.line(&format!(
            "Lock: held by {}@{} (pid {}, '{}') since {}",
            lock.user,
            lock.holder,
            lock.pid,
            lock.command,
            lock.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        None => output.line("Lock: free"),
    }
    if !report.recent.is_empty() {
        output.line("Recent:");
        for entry in report.recent.iter().rev() {
            let action = match entry.action {
                LedgerAction::Deploy => "deploy",
                LedgerAction::Rollback => "rollback",
            };
            output.line(&format!(
                "  {}  {:<8} {:<8} {}",
                entry.id,
                action,
                entry.status,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
    }
    Ok(())
}
