// ABOUTME: Step builders shared by the release-based and legacy deploy paths.
// ABOUTME: Install, build, env linking, and the local frontend build.

use std::path::PathBuf;

use crate::config::Config;
use crate::remote::{Executor, Step, StepKind, quote};

use super::DeployError;
use super::deployment::SourceTree;

/// Default frontend build when none is configured.
const DEFAULT_FRONTEND_BUILD: &str = "npm run build";

pub(crate) fn install_step(config: &Config, dir: &str) -> Step {
    Step::new(
        StepKind::InstallDependencies,
        format!("cd {} && {}", quote(dir), config.install_command),
    )
}

pub(crate) fn build_step(config: &Config, dir: &str) -> Option<Step> {
    config
        .build_command
        .as_ref()
        .map(|build| Step::new(StepKind::Build, format!("cd {} && {}", quote(dir), build)))
}

/// Link `env_file` into `dir` as `.env`, when the env file exists.
pub(crate) fn link_env_step(env_file: &str, dir: &str) -> Step {
    let env = quote(env_file);
    Step::new(
        StepKind::LinkShared,
        format!(
            "if [ -f {env} ]; then ln -sfn {env} {target}; fi",
            target = quote(&format!("{}/.env", dir))
        ),
    )
}

/// Link `env_file` into the build output under `dir`.
///
/// Uses the configured `build_dir`, else whichever of `build/` and `dist/`
/// exists first.
pub(crate) fn link_build_env_step(config: &Config, env_file: &str, dir: &str) -> Step {
    let env = quote(env_file);
    let command = match &config.build_dir {
        Some(build_dir) => {
            let out = quote(&format!("{}/{}", dir, build_dir));
            format!("if [ -f {env} ] && [ -d {out} ]; then ln -sfn {env} {out}/.env; fi")
        }
        None => {
            let base = quote(dir);
            format!(
                "if [ -f {env} ]; then for d in build dist; do if [ -d {base}/\"$d\" ]; then ln -sfn {env} {base}/\"$d\"/.env; break; fi; done; fi"
            )
        }
    };
    Step::new(StepKind::LinkBuildEnv, command)
}

/// Run the frontend build on this machine unless skipped.
pub(crate) async fn local_build<E: Executor + ?Sized>(
    exec: &E,
    config: &Config,
    source: &SourceTree,
) -> Result<(), DeployError> {
    if source.skip_build {
        tracing::debug!("skipping local build");
        return Ok(());
    }
    let command = config
        .build_command
        .as_deref()
        .unwrap_or(DEFAULT_FRONTEND_BUILD);
    let output = exec
        .run_local(&Step::new(StepKind::LocalBuild, command), &source.project_dir)
        .await?;
    crate::remote::ensure_success(StepKind::LocalBuild, output)?;
    Ok(())
}

/// Local directory whose contents are published for a frontend.
pub(crate) fn frontend_output(config: &Config, source: &SourceTree) -> PathBuf {
    source.project_dir.join(&config.dist_dir)
}
