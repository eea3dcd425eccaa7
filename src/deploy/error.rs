// ABOUTME: Error types for release lifecycle operations.
// ABOUTME: Every variant maps to a DeployErrorKind for programmatic handling.

use crate::hooks::HookPoint;
use crate::release::StoreError;
use crate::remote::{ExecError, StepKind};
use crate::types::ReleaseId;

use super::lock::LockInfo;

/// Coarse classification of a [`DeployError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Connection,
    Auth,
    RemoteCommand,
    LockHeld,
    Lock,
    PortConflict,
    HookFailed,
    HealthCheckFailed,
    NoPreviousRelease,
    ReleaseMissing,
    Ledger,
    Interrupted,
    Config,
}

/// Errors that can occur while deploying, rolling back, or migrating.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// A step ran and failed, or could not be started.
    #[error(transparent)]
    RemoteCommand(ExecError),

    #[error(
        "deploy lock held by {holder} (pid {pid}, user {user}, running '{command}') since {started_at}",
        holder = .0.holder,
        pid = .0.pid,
        user = .0.user,
        command = .0.command,
        started_at = .0.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    )]
    LockHeld(Box<LockInfo>),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("port {port} is already in use by {owner}{hint}", hint = suggestion(.suggested))]
    PortConflict {
        port: u16,
        owner: String,
        suggested: Option<u16>,
    },

    #[error("{point} hook failed with exit code {exit_code}")]
    HookFailed { point: HookPoint, exit_code: u32 },

    #[error("release {release} failed health check after {attempts} attempts{outcome}", outcome = rollback_note(.rolled_back_to.as_ref()))]
    HealthCheckFailed {
        release: ReleaseId,
        attempts: u32,
        rolled_back_to: Option<ReleaseId>,
    },

    #[error("no release to roll back to: {available} earlier successful release(s), {requested} requested")]
    NoPreviousRelease { requested: usize, available: usize },

    #[error("release directory for {0} is missing")]
    ReleaseMissing(ReleaseId),

    #[error("{0}")]
    Ledger(String),

    #[error("interrupted")]
    Interrupted,

    #[error("configuration error: {0}")]
    Config(String),
}

fn suggestion(port: &Option<u16>) -> String {
    match port {
        Some(p) => format!(" (port {} is free)", p),
        None => String::new(),
    }
}

fn rollback_note(target: Option<&ReleaseId>) -> String {
    match target {
        Some(id) => format!("; rolled back to {}", id),
        None => String::new(),
    }
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Connection(_) => DeployErrorKind::Connection,
            DeployError::Auth(_) => DeployErrorKind::Auth,
            DeployError::RemoteCommand(_) => DeployErrorKind::RemoteCommand,
            DeployError::LockHeld(_) => DeployErrorKind::LockHeld,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::PortConflict { .. } => DeployErrorKind::PortConflict,
            DeployError::HookFailed { .. } => DeployErrorKind::HookFailed,
            DeployError::HealthCheckFailed { .. } => DeployErrorKind::HealthCheckFailed,
            DeployError::NoPreviousRelease { .. } => DeployErrorKind::NoPreviousRelease,
            DeployError::ReleaseMissing(_) => DeployErrorKind::ReleaseMissing,
            DeployError::Ledger(_) => DeployErrorKind::Ledger,
            DeployError::Interrupted => DeployErrorKind::Interrupted,
            DeployError::Config(_) => DeployErrorKind::Config,
        }
    }

    /// Holder metadata when the lock was held by someone else.
    pub fn lock_holder(&self) -> Option<&LockInfo> {
        match self {
            DeployError::LockHeld(info) => Some(info),
            _ => None,
        }
    }

    /// The step that failed, for remote command errors.
    pub fn failed_step(&self) -> Option<StepKind> {
        match self {
            DeployError::RemoteCommand(e) => e.step_kind(),
            _ => None,
        }
    }
}

impl From<ExecError> for DeployError {
    fn from(err: ExecError) -> Self {
        if let ExecError::Ssh(ssh) = &err {
            if ssh.is_auth() {
                return DeployError::Auth(ssh.to_string());
            }
            if ssh.is_connection() {
                return DeployError::Connection(ssh.to_string());
            }
        }
        DeployError::RemoteCommand(err)
    }
}

impl From<crate::ssh::Error> for DeployError {
    fn from(err: crate::ssh::Error) -> Self {
        DeployError::from(ExecError::from(err))
    }
}

impl From<StoreError> for DeployError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Exec(e) => e.into(),
            other => DeployError::Ledger(other.to_string()),
        }
    }
}
