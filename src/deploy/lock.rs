// ABOUTME: Deploy lock to prevent concurrent deploy/rollback/migrate on one remote root.
// ABOUTME: Atomic hard-link lock creation with holder info in .shipnode/deploy.lock.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::diagnostics::{Diagnostics, Warning};
use crate::release::RemoteLayout;
use crate::remote::{Executor, Step, StepKind, quote};

use super::DeployError;

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// Local user who started the command.
    pub user: String,
    /// Command holding the lock (deploy, rollback, migrate).
    pub command: String,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(user: &str, command: &str) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            user: user.to_string(),
            command: command.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Whether the lock is at least `threshold` old.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        (Utc::now() - self.started_at)
            .to_std()
            .is_ok_and(|age| age >= threshold)
    }
}

/// Parameters for acquiring a lock.
#[derive(Debug, Clone)]
pub struct LockRequest {
    pub user: String,
    pub command: String,
    pub stale_after: Duration,
    /// Break a fresh lock held by someone else.
    pub force: bool,
}

impl LockRequest {
    pub fn new(user: impl Into<String>, command: impl Into<String>, stale_after: Duration) -> Self {
        Self {
            user: user.into(),
            command: command.into(),
            stale_after,
            force: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Result of an operation run under [`DeployLock::with_lock`].
#[derive(Debug)]
pub struct LockScope<T> {
    pub result: Result<T, DeployError>,
    pub release: Result<(), DeployError>,
}

impl<T> LockScope<T> {
    /// The operation's result, with a failed release recorded as a warning.
    pub fn into_result(self, diag: &mut Diagnostics) -> Result<T, DeployError> {
        if let Err(e) = self.release {
            diag.warn(Warning::lock_release(format!(
                "failed to release deploy lock: {}",
                e
            )));
        }
        self.result
    }
}

/// A held deploy lock.
pub struct DeployLock<'a, E: Executor + ?Sized> {
    exec: &'a E,
    path: String,
    info: LockInfo,
}

impl<E: Executor + ?Sized> std::fmt::Debug for DeployLock<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("path", &self.path)
            .field("info", &self.info)
            .finish()
    }
}

enum Existing {
    Held(LockInfo),
    Breakable,
}

impl<'a, E: Executor + ?Sized> DeployLock<'a, E> {
    /// Acquire the deploy lock for `layout`.
    ///
    /// The lock file is written under a temporary name and hard-linked into
    /// place, so creation is atomic and readers never see a partial file.
    /// A stale, unreadable, or corrupt lock is broken with a warning, as is
    /// any lock when `request.force` is set.
    pub async fn acquire(
        exec: &'a E,
        layout: &RemoteLayout,
        request: &LockRequest,
    ) -> Result<Self, DeployError> {
        let path = layout.lock_file();
        let info = LockInfo::new(&request.user, &request.command);
        let json = serde_json::to_string(&info)
            .map_err(|e| DeployError::Lock(format!("failed to serialize lock: {}", e)))?;

        exec.run_checked(&Step::new(
            StepKind::AcquireLock,
            format!("mkdir -p {}", quote(&layout.meta_dir())),
        ))
        .await?;

        // ln fails if the lock exists, and publishes a fully written file
        let lock = quote(&path);
        let acquire = Step::new(
            StepKind::AcquireLock,
            format!(
                "printf '%s\\n' {json} > {lock}.$$ && {{ ln {lock}.$$ {lock} 2>/dev/null; rc=$?; rm -f {lock}.$$; exit $rc; }}",
                json = quote(&json),
            ),
        );

        if exec.run(&acquire).await?.success() {
            tracing::debug!("acquired deploy lock at {}", path);
            return Ok(Self { exec, path, info });
        }

        match Self::inspect_existing(exec, &path, request).await? {
            Existing::Held(holder) => Err(DeployError::LockHeld(Box::new(holder))),
            Existing::Breakable => {
                tracing::debug!("removing stale/forced lock at {}", path);
                exec.run_checked(&Step::new(
                    StepKind::ReleaseLock,
                    format!("rm -f {}", quote(&path)),
                ))
                .await?;

                if exec.run(&acquire).await?.success() {
                    Ok(Self { exec, path, info })
                } else {
                    match read_lock_at(exec, &path).await? {
                        Some(holder) => Err(DeployError::LockHeld(Box::new(holder))),
                        None => Err(DeployError::Lock(
                            "lock acquired by another process during break".to_string(),
                        )),
                    }
                }
            }
        }
    }

    async fn inspect_existing(
        exec: &E,
        path: &str,
        request: &LockRequest,
    ) -> Result<Existing, DeployError> {
        let output = exec
            .run(&Step::new(StepKind::ReadLock, format!("cat {}", quote(path))))
            .await?;

        if !output.success() {
            tracing::warn!("lock info unreadable, breaking lock");
            return Ok(Existing::Breakable);
        }

        match serde_json::from_str::<LockInfo>(output.stdout.trim()) {
            Ok(existing) if request.force => {
                tracing::warn!(
                    "breaking lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                Ok(Existing::Breakable)
            }
            Ok(existing) if existing.is_stale(request.stale_after) => {
                tracing::warn!(
                    "reclaiming stale lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                Ok(Existing::Breakable)
            }
            Ok(existing) => Ok(Existing::Held(existing)),
            Err(_) => {
                tracing::warn!("lock info corrupted, breaking lock");
                Ok(Existing::Breakable)
            }
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release the lock.
    pub async fn release(self) -> Result<(), DeployError> {
        self.exec
            .run_checked(&Step::new(
                StepKind::ReleaseLock,
                format!("rm -f {}", quote(&self.path)),
            ))
            .await?;
        tracing::debug!("released deploy lock at {}", self.path);
        Ok(())
    }

    /// Run `operation` while holding the lock, releasing it afterwards.
    ///
    /// The lock is released when the operation succeeds, fails, or panics
    /// (the panic resumes after release), and on Ctrl-C, which abandons the
    /// operation with [`DeployError::Interrupted`].
    pub async fn with_lock<T, F>(self, operation: F) -> LockScope<T>
    where
        F: Future<Output = Result<T, DeployError>>,
    {
        self.with_lock_until(operation, ctrl_c()).await
    }

    /// Like [`with_lock`](Self::with_lock), abandoning the operation when
    /// `interrupt` completes instead of on Ctrl-C.
    pub async fn with_lock_until<T, F, I>(self, operation: F, interrupt: I) -> LockScope<T>
    where
        F: Future<Output = Result<T, DeployError>>,
        I: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            biased;
            r = AssertUnwindSafe(operation).catch_unwind() => r,
            _ = interrupt => Ok(Err(DeployError::Interrupted)),
        };

        let release = self.release().await;

        match outcome {
            Ok(result) => LockScope { result, release },
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available: never interrupt.
        std::future::pending::<()>().await;
    }
}

async fn read_lock_at<E: Executor + ?Sized>(
    exec: &E,
    path: &str,
) -> Result<Option<LockInfo>, DeployError> {
    let file = quote(path);
    let output = exec
        .run_checked(&Step::new(
            StepKind::ReadLock,
            format!("if [ -f {file} ]; then cat {file}; fi"),
        ))
        .await?;
    let text = output.stdout.trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| DeployError::Lock(format!("lock file {} is corrupt: {}", path, e)))
}

/// Current lock holder, if the root is locked.
pub async fn read_lock<E: Executor + ?Sized>(
    exec: &E,
    layout: &RemoteLayout,
) -> Result<Option<LockInfo>, DeployError> {
    read_lock_at(exec, &layout.lock_file()).await
}

/// Remove the lock regardless of holder, returning who held it.
///
/// A corrupt lock file is removed too; the holder is then unknown.
pub async fn force_unlock<E: Executor + ?Sized>(
    exec: &E,
    layout: &RemoteLayout,
) -> Result<Option<LockInfo>, DeployError> {
    let holder = match read_lock(exec, layout).await {
        Ok(holder) => holder,
        Err(DeployError::Lock(reason)) => {
            tracing::warn!("{}", reason);
            None
        }
        Err(e) => return Err(e),
    };
    exec.run_checked(&Step::new(
        StepKind::ReleaseLock,
        format!("rm -f {}", quote(&layout.lock_file())),
    ))
    .await?;
    Ok(holder)
}
