// ABOUTME: Manual rollback to an earlier successful release.
// ABOUTME: Re-points current, reloads the process, and records the rollback in the ledger.

use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::release::{LedgerEntry, ReleaseStore, RemoteLayout};
use crate::remote::Executor;
use crate::types::ReleaseId;

use super::DeployError;
use super::ecosystem;
use super::health::HealthChecker;
use super::lock::{DeployLock, LockRequest};
use super::strategy::DeployVariant;

/// What a rollback did.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub from: ReleaseId,
    pub to: ReleaseId,
    /// Health checks spent verifying the target, zero when not checked.
    pub health_attempts: u32,
}

/// Roll back `steps_back` distinct successful releases from `current`.
///
/// This function:
/// 1. Reads `current` and the ledger under the deploy lock
/// 2. Picks the `steps_back`-th successful release before `current`
/// 3. Checks its directory still exists
/// 4. Switches `current`, reloads the process, and appends a rollback entry
/// 5. Health-checks backends; failure is reported but not undone
///
/// # Errors
///
/// Returns error if:
/// - The config is not release-based
/// - Fewer than `steps_back` earlier successful releases exist
/// - The target's directory was cleaned up
/// - Any remote step fails
pub async fn rollback<E: Executor + ?Sized>(
    exec: &E,
    config: &Config,
    steps_back: usize,
    user: &str,
    diag: &mut Diagnostics,
) -> Result<RollbackReport, DeployError> {
    if !config.zero_downtime {
        return Err(DeployError::Config(
            "rollback needs release directories; set zero_downtime: true and run migrate"
                .to_string(),
        ));
    }
    if steps_back == 0 {
        return Err(DeployError::Config(
            "rollback step count must be at least 1".to_string(),
        ));
    }

    let layout = RemoteLayout::new(config.remote_root());
    let request = LockRequest::new(user, "rollback", config.lock.stale_after);
    let lock = DeployLock::acquire(exec, &layout, &request).await?;

    let scope = lock
        .with_lock(switch_back(exec, config, layout.clone(), steps_back))
        .await;
    scope.into_result(diag)
}

async fn switch_back<E: Executor + ?Sized>(
    exec: &E,
    config: &Config,
    layout: RemoteLayout,
    steps_back: usize,
) -> Result<RollbackReport, DeployError> {
    let store = ReleaseStore::new(exec, layout.clone());

    let Some(current) = store.current_release().await? else {
        return Err(DeployError::NoPreviousRelease {
            requested: steps_back,
            available: 0,
        });
    };

    let ledger = store.read_ledger().await?;
    let candidates = ledger.successes_before(&current);
    let target = candidates
        .get(steps_back - 1)
        .cloned()
        .ok_or(DeployError::NoPreviousRelease {
            requested: steps_back,
            available: candidates.len(),
        })?;

    if !store.release_exists(&target).await? {
        return Err(DeployError::ReleaseMissing(target));
    }

    tracing::info!("rolling back {} -> {}", current, target);
    store.switch_current(&target).await?;

    let variant = DeployVariant::for_config(config);
    if variant.is_backend() {
        exec.run_all(&[
            ecosystem::write_step(config, &layout, true),
            ecosystem::reload_step(config, &layout),
        ])
        .await?;
    }
    store
        .append(LedgerEntry::rollback(target.clone(), Utc::now()))
        .await?;

    let mut health_attempts = 0;
    if let (Some(port), true) = (config.port, variant.is_backend() && config.healthcheck.enabled) {
        let checker = HealthChecker::from_config(&config.healthcheck, port);
        let outcome = checker.check(exec).await?;
        health_attempts = outcome.attempts;
        if !outcome.healthy {
            return Err(DeployError::HealthCheckFailed {
                release: target,
                attempts: outcome.attempts,
                rolled_back_to: None,
            });
        }
    }

    Ok(RollbackReport {
        from: current,
        to: target,
        health_attempts,
    })
}
