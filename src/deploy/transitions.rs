// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use std::path::Path;

use crate::diagnostics::{Diagnostics, Warning};
use crate::hooks::{HookPoint, HookRunner};
use crate::release::{CleanupReport, ReleaseStatus, ReleaseStore};
use crate::remote::{Executor, StepKind, ensure_success};
use crate::types::ReleaseId;

use super::Deployment;
use super::deployment::SourceTree;
use super::ecosystem;
use super::error::DeployError;
use super::health::HealthChecker;
use super::runner::DeployReport;
use super::state::{Activated, Completed, Initialized, Ready, Staged, Switched, Verified};
use super::steps;

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Deployment<S> {
    fn into_state<T>(self, state: T) -> Deployment<T> {
        Deployment {
            config: self.config,
            layout: self.layout,
            release: self.release,
            previous: self.previous,
            health_attempts: self.health_attempts,
            state,
        }
    }

    fn store<'e, E: Executor + ?Sized>(&self, exec: &'e E) -> ReleaseStore<'e, E> {
        ReleaseStore::new(exec, self.layout.clone())
    }

    /// Start or reload the process manager from a freshly written ecosystem file.
    async fn reload_process<E: Executor + ?Sized>(&self, exec: &E) -> Result<(), DeployError> {
        if !self.variant().is_backend() {
            return Ok(());
        }
        exec.run_all(&[
            ecosystem::write_step(&self.config, &self.layout, true),
            ecosystem::reload_step(&self.config, &self.layout),
        ])
        .await?;
        Ok(())
    }

    /// Point `current` back at the previous release, record this release as
    /// failed, and reload onto the previous release.
    ///
    /// With no successful release to return to, the `current` link this
    /// deploy created is removed so it never names a failed release.
    async fn restore_previous<E: Executor + ?Sized>(
        &self,
        exec: &E,
    ) -> Result<Option<ReleaseId>, DeployError> {
        let store = self.store(exec);

        match &self.previous {
            Some(previous) => {
                tracing::warn!("restoring current -> releases/{}", previous);
                store.switch_current(previous).await?;
            }
            None => {
                tracing::warn!("no successful release to restore; removing current");
                store.clear_current().await?;
            }
        }
        store.record(&self.release, ReleaseStatus::Failed).await?;

        if self.previous.is_some() {
            self.reload_process(exec).await?;
        }
        Ok(self.previous.clone())
    }
}

// =============================================================================
// Initialized -> Staged
// =============================================================================

impl Deployment<Initialized> {
    /// Populate the release directory.
    ///
    /// Backends sync the project, link the shared `.env`, install
    /// dependencies and run the configured build on the server. Frontends
    /// build locally and sync only the build output.
    pub async fn stage<E: Executor + ?Sized>(
        self,
        exec: &E,
        source: &SourceTree,
    ) -> Result<Deployment<Staged>, DeployError> {
        let store = self.store(exec);
        let dir = self.release_dir();

        if self.variant().is_backend() {
            store.create_release(&self.release).await?;
            tracing::info!("syncing {} -> {}", source.project_dir.display(), dir);
            let synced = exec
                .sync(
                    StepKind::SyncFiles,
                    &source.project_dir,
                    &dir,
                    &self.config.sync_excludes(),
                )
                .await?;
            ensure_success(StepKind::SyncFiles, synced)?;

            let shared_env = self.layout.shared_env();
            exec.run_checked(&steps::link_env_step(&shared_env, &dir))
                .await?;
            exec.run_checked(&steps::install_step(&self.config, &dir))
                .await?;
            if let Some(build) = steps::build_step(&self.config, &dir) {
                exec.run_checked(&build).await?;
            }
            exec.run_checked(&steps::link_build_env_step(&self.config, &shared_env, &dir))
                .await?;
        } else {
            steps::local_build(exec, &self.config, source).await?;
            store.create_release(&self.release).await?;

            let output = steps::frontend_output(&self.config, source);
            tracing::info!("syncing {} -> {}", output.display(), dir);
            let synced = exec
                .sync(StepKind::SyncFiles, &output, &dir, &[])
                .await?;
            ensure_success(StepKind::SyncFiles, synced)?;
        }

        Ok(self.into_state(Staged))
    }
}

// =============================================================================
// Staged -> Ready
// =============================================================================

impl Deployment<Staged> {
    /// Run the pre-deploy hook, if any, from the release directory.
    ///
    /// A non-zero exit aborts the deploy before `current` moves.
    pub async fn pre_deploy<E: Executor + ?Sized>(
        self,
        exec: &E,
        hook: Option<&Path>,
    ) -> Result<Deployment<Ready>, DeployError> {
        if let Some(script) = hook {
            let output = HookRunner::new(exec, &self.layout)
                .run(HookPoint::PreDeploy, script, &self.hook_context())
                .await?;
            if !output.success() {
                return Err(DeployError::HookFailed {
                    point: HookPoint::PreDeploy,
                    exit_code: output.exit_code,
                });
            }
        }
        Ok(self.into_state(Ready))
    }
}

// =============================================================================
// Ready -> Switched
// =============================================================================

impl Deployment<Ready> {
    /// Atomically point `current` at the new release.
    pub async fn switch<E: Executor + ?Sized>(
        self,
        exec: &E,
    ) -> Result<Deployment<Switched>, DeployError> {
        self.store(exec).switch_current(&self.release).await?;
        tracing::info!("current -> releases/{}", self.release);
        Ok(self.into_state(Switched))
    }
}

// =============================================================================
// Switched -> Activated
// =============================================================================

impl Deployment<Switched> {
    /// Reload the process manager onto `current`. No-op for frontends.
    pub async fn reload<E: Executor + ?Sized>(self, exec: &E) -> TransitionResult<Activated, Switched> {
        match self.reload_process(exec).await {
            Ok(()) => Ok(self.into_state(Activated)),
            Err(e) => Err((self, e)),
        }
    }

    /// Undo the switch after a failed reload.
    pub async fn revert<E: Executor + ?Sized>(
        self,
        exec: &E,
    ) -> Result<Option<ReleaseId>, DeployError> {
        self.restore_previous(exec).await
    }
}

// =============================================================================
// Activated -> Verified
// =============================================================================

impl Deployment<Activated> {
    /// Poll the health endpoint. Skipped for frontends and when disabled.
    pub async fn health_check<E: Executor + ?Sized>(
        mut self,
        exec: &E,
    ) -> TransitionResult<Verified, Activated> {
        let port = match self.config.port {
            Some(port) if self.variant().is_backend() && self.config.healthcheck.enabled => port,
            _ => return Ok(self.into_state(Verified)),
        };

        let checker = HealthChecker::from_config(&self.config.healthcheck, port);
        tracing::info!("checking health at {}", checker.url());

        match checker.check(exec).await {
            Ok(outcome) => {
                self.health_attempts = outcome.attempts;
                if outcome.healthy {
                    Ok(self.into_state(Verified))
                } else {
                    let err = DeployError::HealthCheckFailed {
                        release: self.release.clone(),
                        attempts: outcome.attempts,
                        rolled_back_to: None,
                    };
                    Err((self, err))
                }
            }
            Err(e) => Err((self, e.into())),
        }
    }

    /// Restore the previous release after a failed health check.
    ///
    /// Returns the release `current` was switched back to, if any.
    pub async fn rollback<E: Executor + ?Sized>(
        self,
        exec: &E,
    ) -> Result<Option<ReleaseId>, DeployError> {
        self.restore_previous(exec).await
    }
}

// =============================================================================
// Verified -> Completed
// =============================================================================

impl Deployment<Verified> {
    /// Record the release as successful.
    pub async fn record<E: Executor + ?Sized>(
        self,
        exec: &E,
    ) -> Result<Deployment<Completed>, DeployError> {
        self.store(exec)
            .record(&self.release, ReleaseStatus::Success)
            .await?;
        Ok(self.into_state(Completed))
    }
}

// =============================================================================
// Completed
// =============================================================================

impl Deployment<Completed> {
    /// Run the post-deploy hook. Failures are warnings; the release stays live.
    pub async fn post_deploy<E: Executor + ?Sized>(
        self,
        exec: &E,
        hook: Option<&Path>,
        diag: &mut Diagnostics,
    ) -> Self {
        let Some(script) = hook else {
            return self;
        };

        match HookRunner::new(exec, &self.layout)
            .run(HookPoint::PostDeploy, script, &self.hook_context())
            .await
        {
            Ok(output) if output.success() => {}
            Ok(output) => diag.warn(Warning::post_deploy_hook(format!(
                "post-deploy hook failed with exit code {}",
                output.exit_code
            ))),
            Err(e) => diag.warn(Warning::post_deploy_hook(format!(
                "post-deploy hook could not run: {}",
                e
            ))),
        }
        self
    }

    /// Remove releases beyond `keep_releases`. Failures are warnings.
    pub async fn cleanup<E: Executor + ?Sized>(
        &self,
        exec: &E,
        diag: &mut Diagnostics,
    ) -> CleanupReport {
        match self.store(exec).cleanup(self.config.keep_releases).await {
            Ok(report) => {
                for (id, reason) in &report.failed {
                    diag.warn(Warning::cleanup(format!(
                        "failed to remove release {}: {}",
                        id, reason
                    )));
                }
                report
            }
            Err(e) => {
                diag.warn(Warning::cleanup(format!("release cleanup skipped: {}", e)));
                CleanupReport::default()
            }
        }
    }

    pub fn finish(self) -> DeployReport {
        DeployReport {
            variant: self.variant(),
            release: Some(self.release),
            previous: self.previous,
            health_attempts: self.health_attempts,
            removed: Vec::new(),
        }
    }
}
