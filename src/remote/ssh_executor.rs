// ABOUTME: Executor backed by a live SSH session plus local rsync and build commands.
// ABOUTME: The only place that combines session parameters with file transfer.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::rsync::{RsyncOptions, build_rsync_args};
use super::{CommandOutput, ExecError, Executor, Step, StepKind, run_shell};
use crate::ssh::Session;

/// Runs steps over a single reusable SSH session.
#[derive(Debug)]
pub struct SshExecutor {
    session: Session,
    rsync: RsyncOptions,
}

impl SshExecutor {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            rsync: RsyncOptions::default(),
        }
    }

    pub fn with_rsync(mut self, rsync: RsyncOptions) -> Self {
        self.rsync = rsync;
        self
    }

    /// Close the underlying session.
    pub async fn disconnect(self) -> crate::ssh::Result<()> {
        self.session.disconnect().await
    }
}

#[async_trait]
impl Executor for SshExecutor {
    async fn run(&self, step: &Step) -> Result<CommandOutput, ExecError> {
        tracing::debug!("{}", step.kind);
        Ok(self
            .session
            .exec(&step.command, step.stdin.as_deref())
            .await?)
    }

    async fn sync(
        &self,
        kind: StepKind,
        local: &Path,
        remote: &str,
        excludes: &[String],
    ) -> Result<CommandOutput, ExecError> {
        let args = build_rsync_args(&self.rsync, self.session.config(), local, remote, excludes);
        tracing::debug!("{}: {} {:?}", kind, self.rsync.rsync_bin, args);

        let output = Command::new(&self.rsync.rsync_bin)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                program: self.rsync.rsync_bin.clone(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output
                .status
                .code()
                .and_then(|c| u32::try_from(c).ok())
                .unwrap_or(255),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_local(&self, step: &Step, dir: &Path) -> Result<CommandOutput, ExecError> {
        tracing::debug!("local {} in {}", step, dir.display());
        run_shell(step, Some(dir)).await
    }
}
