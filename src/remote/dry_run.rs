// ABOUTME: Dry-run executor that records planned steps instead of running them.
// ABOUTME: Every step "succeeds" with empty output, so the full decision tree is rendered.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;

use super::{CommandOutput, ExecError, Executor, Step, StepKind};

/// Where a planned step would have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTarget {
    Remote,
    Local,
    Transfer,
}

/// One step the deploy would have performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub target: PlanTarget,
    pub kind: StepKind,
    pub command: String,
}

impl fmt::Display for PlannedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            PlanTarget::Remote => "remote",
            PlanTarget::Local => "local",
            PlanTarget::Transfer => "rsync",
        };
        write!(f, "[{}] {}: {}", target, self.kind, self.command)
    }
}

/// Records steps without opening a connection.
#[derive(Debug, Default)]
pub struct DryRun {
    plan: Mutex<Vec<PlannedStep>>,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps recorded so far, in order.
    pub fn plan(&self) -> Vec<PlannedStep> {
        self.plan.lock().clone()
    }

    /// Kinds of recorded steps, in order.
    pub fn kinds(&self) -> Vec<StepKind> {
        self.plan.lock().iter().map(|s| s.kind).collect()
    }

    fn record(&self, target: PlanTarget, kind: StepKind, command: String) {
        self.plan.lock().push(PlannedStep {
            target,
            kind,
            command,
        });
    }

    fn empty() -> CommandOutput {
        CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

#[async_trait]
impl Executor for DryRun {
    async fn run(&self, step: &Step) -> Result<CommandOutput, ExecError> {
        self.record(PlanTarget::Remote, step.kind, step.command.clone());
        Ok(Self::empty())
    }

    async fn sync(
        &self,
        kind: StepKind,
        local: &Path,
        remote: &str,
        excludes: &[String],
    ) -> Result<CommandOutput, ExecError> {
        let mut command = format!("{} -> {}", local.display(), remote);
        if !excludes.is_empty() {
            command.push_str(&format!(" (excluding {})", excludes.join(", ")));
        }
        self.record(PlanTarget::Transfer, kind, command);
        Ok(Self::empty())
    }

    async fn run_local(&self, step: &Step, dir: &Path) -> Result<CommandOutput, ExecError> {
        self.record(
            PlanTarget::Local,
            step.kind,
            format!("(in {}) {}", dir.display(), step.command),
        );
        Ok(Self::empty())
    }
}
