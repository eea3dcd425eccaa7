// ABOUTME: Local command execution: build commands and the local-shell executor.
// ABOUTME: LocalShell runs every step against this machine's filesystem instead of over SSH.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{CommandOutput, ExecError, Executor, Step, StepKind};

/// Run `step` with `sh -c`, optionally in `dir`, capturing output.
///
/// The step's stdin payload, if any, is written while output is drained so
/// neither side can fill its pipe and stall the other.
pub async fn run_shell(step: &Step, dir: Option<&Path>) -> Result<CommandOutput, ExecError> {
    let spawn_error = |source| ExecError::Spawn {
        program: "sh".to_string(),
        source,
    };

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&step.command)
        .stdin(if step.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(spawn_error)?;
    let pipe = child.stdin.take();
    let feed = async move {
        if let (Some(mut pipe), Some(input)) = (pipe, step.stdin.as_deref()) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.shutdown().await?;
        }
        Ok::<(), std::io::Error>(())
    };
    // A command that exits without reading its input closes the pipe early;
    // its exit status is what counts.
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    if let Err(e) = fed {
        tracing::debug!("stdin for {} not fully written: {}", step.kind, e);
    }
    let output = output.map_err(spawn_error)?;

    Ok(CommandOutput {
        // Killed by a signal: report the conventional shell status.
        exit_code: output
            .status
            .code()
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(255),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Executor whose "remote host" is the local machine.
///
/// Remote paths are local paths. File transfer is a recursive copy honoring
/// excludes by entry name, mirroring rsync's `--delete` for directories.
#[derive(Debug, Clone, Default)]
pub struct LocalShell;

impl LocalShell {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for LocalShell {
    async fn run(&self, step: &Step) -> Result<CommandOutput, ExecError> {
        tracing::debug!("local {}", step);
        run_shell(step, None).await
    }

    async fn sync(
        &self,
        kind: StepKind,
        local: &Path,
        remote: &str,
        excludes: &[String],
    ) -> Result<CommandOutput, ExecError> {
        tracing::debug!("local {}: {} -> {}", kind, local.display(), remote);
        let source = local.to_path_buf();
        let dest = std::path::PathBuf::from(remote);
        let excludes: Vec<String> = excludes
            .iter()
            .map(|e| e.trim_matches('/').to_string())
            .collect();

        let result =
            tokio::task::spawn_blocking(move || copy::mirror(&source, &dest, &excludes)).await;

        let outcome = match result {
            Ok(inner) => inner.map_err(|e| e.to_string()),
            Err(join) => Err(join.to_string()),
        };

        Ok(match outcome {
            Ok(()) => CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            },
            // rsync's "partial transfer" status
            Err(message) => CommandOutput {
                exit_code: 23,
                stdout: String::new(),
                stderr: message,
            },
        })
    }

    async fn run_local(&self, step: &Step, dir: &Path) -> Result<CommandOutput, ExecError> {
        run_shell(step, Some(dir)).await
    }
}

mod copy {
    use std::fs;
    use std::io;
    use std::path::Path;

    pub(super) fn mirror(source: &Path, dest: &Path, excludes: &[String]) -> io::Result<()> {
        let meta = fs::symlink_metadata(source)?;
        if meta.is_dir() {
            fs::create_dir_all(dest)?;
            remove_extraneous(source, dest, excludes)?;
            copy_dir(source, dest, excludes)
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source, dest).map(|_| ())
        }
    }

    fn excluded(name: &std::ffi::OsStr, excludes: &[String]) -> bool {
        let name = name.to_string_lossy();
        excludes.iter().any(|e| e.as_str() == name)
    }

    fn copy_dir(source: &Path, dest: &Path, excludes: &[String]) -> io::Result<()> {
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            if excluded(&entry.file_name(), excludes) {
                continue;
            }
            let target = dest.join(entry.file_name());
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                fs::create_dir_all(&target)?;
                copy_dir(&entry.path(), &target, excludes)?;
            } else if file_type.is_symlink() {
                let link = fs::read_link(entry.path())?;
                let _ = fs::remove_file(&target);
                std::os::unix::fs::symlink(link, &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }

    fn remove_extraneous(source: &Path, dest: &Path, excludes: &[String]) -> io::Result<()> {
        for entry in fs::read_dir(dest)? {
            let entry = entry?;
            let name = entry.file_name();
            if excluded(&name, excludes) || source.join(&name).exists() {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}
