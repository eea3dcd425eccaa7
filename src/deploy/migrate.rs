// ABOUTME: One-time conversion of a legacy in-place deployment to the release layout.
// ABOUTME: Moves the app files into a first release and points current at it.

use serde::Serialize;

use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::release::{ReleaseStatus, ReleaseStore, RemoteLayout};
use crate::remote::{Executor, Step, StepKind, quote};
use crate::types::ReleaseId;

use super::DeployError;
use super::ecosystem;
use super::lock::{DeployLock, LockRequest};
use super::steps;
use super::strategy::DeployVariant;

/// Entries of the remote root that belong to the release layout itself.
const LAYOUT_ENTRIES: [&str; 4] = ["releases", "shared", ".shipnode", "current"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "release", rename_all = "snake_case")]
pub enum MigrateOutcome {
    /// Files moved into this release, now current.
    Migrated(ReleaseId),
    AlreadyMigrated,
    /// The remote root is missing or holds no app files.
    NothingToMigrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteState {
    Migrated,
    Legacy,
    Empty,
}

fn detect_step(layout: &RemoteLayout) -> Step {
    let root = quote(layout.root());
    let ignored: Vec<String> = LAYOUT_ENTRIES
        .iter()
        .map(|e| format!("-e {}", quote(e)))
        .collect();
    Step::new(
        StepKind::DetectLayout,
        format!(
            "if [ -d {releases} ] && [ -L {current} ]; then echo migrated; \
             elif [ -n \"$(ls -A {root} | grep -v -x {ignored})\" ]; then echo legacy; \
             else echo empty; fi",
            releases = quote(&layout.releases_dir()),
            current = quote(&layout.current_link()),
            ignored = ignored.join(" "),
        ),
    )
}

fn move_entries_step(layout: &RemoteLayout, release_dir: &str) -> Step {
    let skip = LAYOUT_ENTRIES.join("|");
    Step::new(
        StepKind::MigrateFiles,
        format!(
            "cd {root} && for f in * .[!.]* ..?*; do case \"$f\" in {skip}|current.tmp-*) continue;; esac; \
             if [ -e \"$f\" ] || [ -L \"$f\" ]; then mv \"$f\" {dest}/; fi; done",
            root = quote(layout.root()),
            dest = quote(release_dir),
        ),
    )
}

fn move_env_step(layout: &RemoteLayout) -> Step {
    let legacy = quote(&format!("{}/.env", layout.root()));
    let shared = quote(&layout.shared_env());
    Step::new(
        StepKind::MigrateFiles,
        format!("if [ -f {legacy} ] && [ ! -e {shared} ]; then mv {legacy} {shared}; fi"),
    )
}

async fn detect<E: Executor + ?Sized>(
    exec: &E,
    layout: &RemoteLayout,
) -> Result<RemoteState, DeployError> {
    let output = exec.run_checked(&detect_step(layout)).await?;
    Ok(match output.stdout.trim() {
        "migrated" => RemoteState::Migrated,
        "legacy" => RemoteState::Legacy,
        _ => RemoteState::Empty,
    })
}

/// Convert a legacy deployment in place.
///
/// The existing files become the first release, recorded as successful.
/// `.env` moves to `shared/.env` unless one is already there. Reloading a
/// backend afterwards is best-effort.
pub async fn migrate<E: Executor + ?Sized>(
    exec: &E,
    config: &Config,
    user: &str,
    diag: &mut Diagnostics,
) -> Result<MigrateOutcome, DeployError> {
    let layout = RemoteLayout::new(config.remote_root());

    // Read-only look first: taking the lock creates `.shipnode/`, which a
    // no-op migrate must not leave behind.
    match detect(exec, &layout).await? {
        RemoteState::Migrated => return Ok(MigrateOutcome::AlreadyMigrated),
        RemoteState::Empty => return Ok(MigrateOutcome::NothingToMigrate),
        RemoteState::Legacy => {}
    }

    let request = LockRequest::new(user, "migrate", config.lock.stale_after);
    let lock = DeployLock::acquire(exec, &layout, &request).await?;
    let scope = lock
        .with_lock(async {
            // Another run may have migrated while we waited for the lock.
            match detect(exec, &layout).await? {
                RemoteState::Migrated => return Ok(MigrateOutcome::AlreadyMigrated),
                RemoteState::Empty => return Ok(MigrateOutcome::NothingToMigrate),
                RemoteState::Legacy => {}
            }

            let store = ReleaseStore::new(exec, layout.clone());
            store.ensure_structure().await?;
            let release = store.next_release_id().await?;
            let dir = store.create_release(&release).await?;
            tracing::info!("migrating {} into releases/{}", layout.root(), release);

            exec.run_all(&[
                move_env_step(&layout),
                move_entries_step(&layout, &dir),
                steps::link_env_step(&layout.shared_env(), &dir),
            ])
            .await?;
            store.switch_current(&release).await?;
            store.record(&release, ReleaseStatus::Success).await?;

            if DeployVariant::for_config(config).is_backend() {
                let reloaded = exec
                    .run_all(&[
                        ecosystem::write_step(config, &layout, true),
                        ecosystem::reload_step(config, &layout),
                    ])
                    .await;
                if let Err(e) = reloaded {
                    diag.warn(Warning::recovery(format!(
                        "migrated, but reloading {} from current failed: {}",
                        config.app, e
                    )));
                }
            }

            Ok::<_, DeployError>(MigrateOutcome::Migrated(release))
        })
        .await;
    scope.into_result(diag)
}
