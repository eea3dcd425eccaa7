// ABOUTME: Hooks system for deployment lifecycle events.
// ABOUTME: Uploads operator scripts and runs them remotely inside the release directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::release::RemoteLayout;
use crate::remote::{CommandOutput, ExecError, Executor, Step, StepKind, ensure_success, quote};
use crate::types::{AppName, ReleaseId};

/// Hook execution points in the deployment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before `current` is switched. Failure aborts deployment.
    PreDeploy,
    /// After the release is recorded. Failure logs warning.
    PostDeploy,
}

impl HookPoint {
    /// Get the hook filename for this point.
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::PreDeploy => "pre-deploy",
            HookPoint::PostDeploy => "post-deploy",
        }
    }

    /// Whether failure at this hook point should abort deployment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreDeploy)
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.filename())
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub app: AppName,
    /// `None` for legacy deploys, which have no release directories.
    pub release: Option<ReleaseId>,
    /// Directory the hook runs in.
    pub release_dir: String,
    pub remote_root: String,
    /// Env file exported into the hook's environment, if present.
    pub env_file: String,
    pub previous_release: Option<ReleaseId>,
    pub node_env: String,
}

impl HookContext {
    /// Convert context to environment variables.
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("SHIPNODE_APP".to_string(), self.app.to_string());
        if let Some(ref release) = self.release {
            env.insert("SHIPNODE_RELEASE".to_string(), release.to_string());
        }
        env.insert("SHIPNODE_RELEASE_PATH".to_string(), self.release_dir.clone());
        env.insert("SHIPNODE_REMOTE_PATH".to_string(), self.remote_root.clone());
        env.insert("NODE_ENV".to_string(), self.node_env.clone());
        if let Some(ref prev) = self.previous_release {
            env.insert("SHIPNODE_PREVIOUS_RELEASE".to_string(), prev.to_string());
        }
        env
    }
}

/// Uploads and runs hook scripts through an executor.
pub struct HookRunner<'a, E: Executor + ?Sized> {
    exec: &'a E,
    layout: &'a RemoteLayout,
}

impl<'a, E: Executor + ?Sized> HookRunner<'a, E> {
    pub fn new(exec: &'a E, layout: &'a RemoteLayout) -> Self {
        Self { exec, layout }
    }

    /// Shell command that runs an uploaded hook for `context`.
    ///
    /// The hook runs from the release directory with the env file exported,
    /// followed by the `SHIPNODE_*` variables.
    pub fn command(&self, point: HookPoint, context: &HookContext) -> String {
        let env_file = quote(&context.env_file);
        let exports: Vec<String> = context
            .to_env()
            .iter()
            .map(|(k, v)| format!("{}={}", k, quote(v)))
            .collect();

        format!(
            "cd {dir} && if [ -f {env} ]; then set -a; . {env}; set +a; fi && export {exports} && sh {hook}",
            dir = quote(&context.release_dir),
            env = env_file,
            exports = exports.join(" "),
            hook = quote(&self.layout.hook_file(point.filename())),
        )
    }

    /// Copy `script` to the server and run it.
    ///
    /// Returns the hook's output whatever its exit status; the caller decides
    /// whether a failure is fatal.
    pub async fn run(
        &self,
        point: HookPoint,
        script: &Path,
        context: &HookContext,
    ) -> Result<CommandOutput, ExecError> {
        tracing::info!("running {} hook: {}", point, script.display());

        self.exec
            .run_checked(&Step::new(
                StepKind::UploadHook,
                format!("mkdir -p {}", quote(&self.layout.hooks_dir())),
            ))
            .await?;
        let uploaded = self
            .exec
            .sync(
                StepKind::UploadHook,
                script,
                &self.layout.hook_file(point.filename()),
                &[],
            )
            .await?;
        ensure_success(StepKind::UploadHook, uploaded)?;

        let output = self
            .exec
            .run(&Step::new(StepKind::RunHook, self.command(point, context)))
            .await?;

        if output.success() {
            tracing::info!("{} hook completed successfully", point);
        } else {
            tracing::warn!("{} hook failed with exit code {}", point, output.exit_code);
        }

        Ok(output)
    }
}
