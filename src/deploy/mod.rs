// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports the deploy, rollback and migrate entry points and their building blocks.

mod deployment;
pub mod ecosystem;
mod error;
mod health;
mod lock;
mod migrate;
mod port;
mod rollback;
mod runner;
mod state;
mod steps;
mod strategy;
mod transitions;

pub use deployment::{Deployment, SourceTree};
pub use error::{DeployError, DeployErrorKind};
pub use health::{HealthChecker, HealthOutcome};
pub use lock::{DeployLock, LockInfo, LockRequest, LockScope, force_unlock, read_lock};
pub use migrate::{MigrateOutcome, migrate};
pub use port::{PortStatus, check_port};
pub use rollback::{RollbackReport, rollback};
pub use runner::{DeployOptions, DeployReport, deploy};
pub use state::{Activated, Completed, Initialized, Ready, Staged, Switched, Verified};
pub use strategy::{DeployMode, DeployVariant};
pub use transitions::TransitionResult;
