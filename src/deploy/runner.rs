// ABOUTME: Deploy entry point: takes the lock and drives one deploy variant to completion.
// ABOUTME: Release-based deploys run the typestate chain; legacy deploys sync in place.

use std::path::Path;

use serde::Serialize;

use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::hooks::{HookContext, HookPoint, HookRunner};
use crate::release::{ReleaseStatus, ReleaseStore, RemoteLayout};
use crate::remote::{Executor, Step, StepKind, ensure_success, quote};
use crate::types::ReleaseId;

use super::deployment::{Deployment, SourceTree};
use super::ecosystem;
use super::error::DeployError;
use super::health::HealthChecker;
use super::lock::{DeployLock, LockRequest};
use super::port::{PortStatus, check_port};
use super::steps;
use super::strategy::DeployVariant;

/// Remote-root entries a legacy sync must never overwrite or delete.
const LEGACY_PROTECTED: [&str; 5] = ["/releases", "/shared", "/current", "/.shipnode", "/.env"];

/// Inputs to a deploy beyond the configuration.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub source: SourceTree,
    /// Local user recorded in the lock.
    pub user: String,
    /// Break a lock held by someone else.
    pub force: bool,
    /// Skip checks that need real remote state (port ownership).
    pub dry_run: bool,
}

impl DeployOptions {
    pub fn new(source: SourceTree, user: impl Into<String>) -> Self {
        Self {
            source,
            user: user.into(),
            force: false,
            dry_run: false,
        }
    }
}

/// What a finished deploy did.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    #[serde(serialize_with = "serialize_variant")]
    pub variant: DeployVariant,
    /// `None` for legacy deploys.
    pub release: Option<ReleaseId>,
    pub previous: Option<ReleaseId>,
    pub health_attempts: u32,
    /// Release directories removed by cleanup.
    pub removed: Vec<ReleaseId>,
}

fn serialize_variant<S: serde::Serializer>(variant: &DeployVariant, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(variant)
}

/// Deploy the project described by `config` under the deploy lock.
pub async fn deploy<E: Executor + ?Sized>(
    exec: &E,
    config: &Config,
    options: &DeployOptions,
    diag: &mut Diagnostics,
) -> Result<DeployReport, DeployError> {
    let layout = RemoteLayout::new(config.remote_root());
    let variant = DeployVariant::for_config(config);
    tracing::info!("deploying {} as {}", config.app, variant);

    // Read-only, so a conflict is reported before anything on the server changes.
    guard_port(exec, config, options, diag).await?;

    let request = LockRequest::new(&options.user, "deploy", config.lock.stale_after)
        .force(options.force);
    let lock = DeployLock::acquire(exec, &layout, &request).await?;

    let scope = lock
        .with_lock(async {
            if variant.is_zero_downtime() {
                deploy_release(exec, config, options, diag).await
            } else {
                deploy_in_place(exec, config, &layout, options, diag).await
            }
        })
        .await;
    scope.into_result(diag)
}

async fn guard_port<E: Executor + ?Sized>(
    exec: &E,
    config: &Config,
    options: &DeployOptions,
    diag: &mut Diagnostics,
) -> Result<(), DeployError> {
    let Some(port) = config.port else {
        return Ok(());
    };
    if options.dry_run || !DeployVariant::for_config(config).is_backend() {
        return Ok(());
    }

    match check_port(exec, port, &config.app).await? {
        PortStatus::Free | PortStatus::OwnApp => Ok(()),
        PortStatus::Unknown(reason) => {
            diag.warn(Warning::port_check(format!(
                "could not check port {}: {}",
                port, reason
            )));
            Ok(())
        }
    }
}

async fn record_failed<E: Executor + ?Sized>(
    store: &ReleaseStore<'_, E>,
    release: &ReleaseId,
    diag: &mut Diagnostics,
) {
    if let Err(e) = store.record(release, ReleaseStatus::Failed).await {
        diag.warn(Warning::recovery(format!(
            "failed to record release {} as failed: {}",
            release, e
        )));
    }
}

/// Release-directory deploy with an atomic `current` switch.
async fn deploy_release<E: Executor + ?Sized>(
    exec: &E,
    config: &Config,
    options: &DeployOptions,
    diag: &mut Diagnostics,
) -> Result<DeployReport, DeployError> {
    let store = ReleaseStore::new(exec, RemoteLayout::new(config.remote_root()));
    store.ensure_structure().await?;

    // Fall back to what the ledger says last worked, not to whatever
    // `current` happens to name.
    let previous = store.latest_live_success().await?;
    let release = store.next_release_id().await?;
    tracing::info!(
        "release {} (previous: {})",
        release,
        previous.as_ref().map_or("none".to_string(), |p| p.to_string())
    );

    let project_dir = &options.source.project_dir;
    let pre_hook = config.pre_deploy_hook(project_dir);
    let post_hook = config.post_deploy_hook(project_dir);

    let deployment = Deployment::new(config.clone(), release.clone(), previous);

    let prepared = async {
        deployment
            .stage(exec, &options.source)
            .await?
            .pre_deploy(exec, pre_hook.as_deref())
            .await?
            .switch(exec)
            .await
    }
    .await;

    let switched = match prepared {
        Ok(switched) => switched,
        Err(e) => {
            record_failed(&store, &release, diag).await;
            return Err(e);
        }
    };

    let activated = match switched.reload(exec).await {
        Ok(activated) => activated,
        Err((switched, e)) => {
            if let Err(revert) = switched.revert(exec).await {
                diag.warn(Warning::recovery(format!(
                    "failed to restore previous release: {}",
                    revert
                )));
            }
            return Err(e);
        }
    };

    let verified = match activated.health_check(exec).await {
        Ok(verified) => verified,
        Err((activated, e)) => {
            let rolled_back_to = match activated.rollback(exec).await {
                Ok(target) => target,
                Err(rollback) => {
                    diag.warn(Warning::recovery(format!(
                        "automatic rollback did not complete: {}",
                        rollback
                    )));
                    None
                }
            };
            return Err(match e {
                DeployError::HealthCheckFailed {
                    release, attempts, ..
                } => DeployError::HealthCheckFailed {
                    release,
                    attempts,
                    rolled_back_to,
                },
                other => other,
            });
        }
    };

    let completed = verified
        .record(exec)
        .await?
        .post_deploy(exec, post_hook.as_deref(), diag)
        .await;
    let cleanup = completed.cleanup(exec, diag).await;

    let mut report = completed.finish();
    report.removed = cleanup.removed;
    Ok(report)
}

/// Sync straight into the remote root. No release directories, no ledger.
async fn deploy_in_place<E: Executor + ?Sized>(
    exec: &E,
    config: &Config,
    layout: &RemoteLayout,
    options: &DeployOptions,
    diag: &mut Diagnostics,
) -> Result<DeployReport, DeployError> {
    let variant = DeployVariant::for_config(config);
    let root = layout.root();
    let project_dir = &options.source.project_dir;

    exec.run_checked(&Step::new(
        StepKind::EnsureStructure,
        format!(
            "mkdir -p {} {} {}",
            quote(root),
            quote(&layout.logs_dir()),
            quote(&layout.meta_dir())
        ),
    ))
    .await?;

    let context = HookContext {
        app: config.app.clone(),
        release: None,
        release_dir: root.to_string(),
        remote_root: root.to_string(),
        env_file: format!("{}/.env", root),
        previous_release: None,
        node_env: config.node_env.clone(),
    };
    let hooks = HookRunner::new(exec, layout);
    let pre_hook = config.pre_deploy_hook(project_dir);

    let mut health_attempts = 0;
    if variant.is_backend() {
        let mut excludes = config.sync_excludes();
        excludes.extend(LEGACY_PROTECTED.iter().map(|p| p.to_string()));
        sync_checked(exec, project_dir, root, &excludes).await?;

        exec.run_checked(&steps::install_step(config, root)).await?;
        if let Some(build) = steps::build_step(config, root) {
            exec.run_checked(&build).await?;
        }
        exec.run_checked(&steps::link_build_env_step(config, &context.env_file, root))
            .await?;

        run_pre_hook(&hooks, pre_hook.as_deref(), &context).await?;

        exec.run_all(&[
            ecosystem::write_step(config, layout, false),
            ecosystem::reload_step(config, layout),
        ])
        .await?;

        if let (Some(port), true) = (config.port, config.healthcheck.enabled) {
            let checker = HealthChecker::from_config(&config.healthcheck, port);
            let outcome = checker.check(exec).await?;
            health_attempts = outcome.attempts;
            if !outcome.healthy {
                diag.warn(Warning::advisory_health(format!(
                    "{} failed health check after {} attempts; legacy deploys cannot roll back",
                    checker.url(),
                    outcome.attempts
                )));
            }
        }
    } else {
        steps::local_build(exec, config, &options.source).await?;
        run_pre_hook(&hooks, pre_hook.as_deref(), &context).await?;

        let excludes: Vec<String> = LEGACY_PROTECTED.iter().map(|p| p.to_string()).collect();
        let output = steps::frontend_output(config, &options.source);
        sync_checked(exec, &output, root, &excludes).await?;
    }

    if let Some(script) = config.post_deploy_hook(project_dir) {
        match hooks.run(HookPoint::PostDeploy, &script, &context).await {
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
    }

    Ok(DeployReport {
        variant,
        release: None,
        previous: None,
        health_attempts,
        removed: Vec::new(),
    })
}

async fn sync_checked<E: Executor + ?Sized>(
    exec: &E,
    local: &Path,
    remote: &str,
    excludes: &[String],
) -> Result<(), DeployError> {
    tracing::info!("syncing {} -> {}", local.display(), remote);
    let output = exec
        .sync(StepKind::SyncFiles, local, remote, excludes)
        .await?;
    ensure_success(StepKind::SyncFiles, output)?;
    Ok(())
}

async fn run_pre_hook<E: Executor + ?Sized>(
    hooks: &HookRunner<'_, E>,
    script: Option<&Path>,
    context: &HookContext,
) -> Result<(), DeployError> {
    let Some(script) = script else {
        return Ok(());
    };
    let output = hooks.run(HookPoint::PreDeploy, script, context).await?;
    if output.success() {
        Ok(())
    } else {
        Err(DeployError::HookFailed {
            point: HookPoint::PreDeploy,
            exit_code: output.exit_code,
        })
    }
}
