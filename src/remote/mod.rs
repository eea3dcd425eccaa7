// ABOUTME: Remote executor abstraction: every side effect of a command goes through here.
// ABOUTME: SSH, dry-run, and local-shell implementations share one async trait.

mod dry_run;
mod local;
mod rsync;
mod ssh_executor;
mod step;

pub use dry_run::{DryRun, PlanTarget, PlannedStep};
pub use local::{LocalShell, run_shell};
pub use rsync::{RsyncOptions, build_rsync_args};
pub use ssh_executor::SshExecutor;
pub use step::{Step, StepKind, quote};

pub use crate::ssh::CommandOutput;

use async_trait::async_trait;
use std::path::Path;

/// Errors from running steps.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Transport-level failure (connection, authentication, channel).
    #[error(transparent)]
    Ssh(#[from] crate::ssh::Error),

    /// A local program could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The step ran and exited non-zero.
    #[error("{kind} failed with exit code {exit_code}{detail}", detail = stderr_suffix(.stderr))]
    NonZeroExit {
        kind: StepKind,
        exit_code: u32,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

impl ExecError {
    /// The step kind that failed, if the failure was a non-zero exit.
    pub fn step_kind(&self) -> Option<StepKind> {
        match self {
            ExecError::NonZeroExit { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Turn a non-zero exit status into an error attributed to `kind`.
pub fn ensure_success(kind: StepKind, output: CommandOutput) -> Result<CommandOutput, ExecError> {
    if output.success() {
        Ok(output)
    } else {
        Err(ExecError::NonZeroExit {
            kind,
            exit_code: output.exit_code,
            stderr: output.stderr,
        })
    }
}

/// Runs steps against a deployment target.
///
/// Success of a step is decided by its exit status alone. Output is only ever
/// read as data (ledger JSON, link targets, process lists).
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a step on the target host, returning its output whatever the exit status.
    async fn run(&self, step: &Step) -> Result<CommandOutput, ExecError>;

    /// Push `local` to `remote` on the target host.
    ///
    /// A directory source syncs its contents into `remote`, deleting extraneous
    /// files; a file source is copied to the `remote` path.
    async fn sync(
        &self,
        kind: StepKind,
        local: &Path,
        remote: &str,
        excludes: &[String],
    ) -> Result<CommandOutput, ExecError>;

    /// Run a step on the operator's machine, in `dir`.
    async fn run_local(&self, step: &Step, dir: &Path) -> Result<CommandOutput, ExecError>;

    /// Run a step and fail on a non-zero exit status.
    async fn run_checked(&self, step: &Step) -> Result<CommandOutput, ExecError> {
        let output = self.run(step).await?;
        ensure_success(step.kind, output)
    }

    /// Run steps in order, stopping at the first failure.
    async fn run_all(&self, steps: &[Step]) -> Result<(), ExecError> {
        for step in steps {
            self.run_checked(step).await?;
        }
        Ok(())
    }
}
