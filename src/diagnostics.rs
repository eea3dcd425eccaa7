// ABOUTME: Non-fatal problems noticed while deploying, rolling back, or migrating.
// ABOUTME: Commands print them after the run; they never change the exit status.

use serde::Serialize;
use std::fmt;

/// What kind of best-effort work did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// The deploy lock file could not be removed and may block the next run.
    LockRelease,
    SshDisconnect,
    /// Old release directories were left behind.
    CleanupFailed,
    PostDeployHook,
    /// Legacy-mode health check failed; legacy deploys cannot revert.
    AdvisoryHealth,
    /// Port ownership could not be determined.
    PortCheck,
    /// Revert, failure bookkeeping, or a reload after a failure.
    Recovery,
}

impl WarningKind {
    pub fn label(&self) -> &'static str {
        match self {
            WarningKind::LockRelease => "lock",
            WarningKind::SshDisconnect => "ssh",
            WarningKind::CleanupFailed => "cleanup",
            WarningKind::PostDeployHook => "post-deploy hook",
            WarningKind::AdvisoryHealth => "health",
            WarningKind::PortCheck => "port",
            WarningKind::Recovery => "recovery",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

macro_rules! warning_constructors {
    ($($name:ident => $kind:ident),* $(,)?) => {
        impl Warning {
            $(
                pub fn $name(message: impl Into<String>) -> Self {
                    Self::new(WarningKind::$kind, message)
                }
            )*
        }
    };
}

warning_constructors! {
    lock_release => LockRelease,
    ssh_disconnect => SshDisconnect,
    cleanup => CleanupFailed,
    post_deploy_hook => PostDeployHook,
    advisory_health => AdvisoryHealth,
    port_check => PortCheck,
    recovery => Recovery,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.label(), self.message)
    }
}

/// Warnings collected over one command, in the order they happened.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record `warning` and log it at warn level.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = warning.kind.label(), "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn of_kind(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}
