// ABOUTME: Executor test double: a real local filesystem with scripted process manager, port and health answers.
// ABOUTME: Records every step kind so tests can assert on what ran and in which order.

use async_trait::async_trait;
use parking_lot::Mutex;
use shipnode::remote::{CommandOutput, ExecError, Executor, LocalShell, Step, StepKind};
use std::collections::{HashSet, VecDeque};
use std::path::Path;

/// Runs filesystem steps for real through [`LocalShell`] and answers the
/// rest (npm, pm2, curl, lsof) from a script.
#[derive(Default)]
pub struct FakeRemote {
    shell: LocalShell,
    health: Mutex<VecDeque<bool>>,
    failing: Mutex<HashSet<StepKind>>,
    kinds: Mutex<Vec<StepKind>>,
    /// `(pid, pm2 name)` listening on the app's port.
    port_owner: Mutex<Option<(u32, String)>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue health check results; once drained, checks succeed.
    pub fn health_results(&self, results: &[bool]) {
        self.health.lock().extend(results.iter().copied());
    }

    /// Make every step of `kind` exit 1.
    pub fn fail(&self, kind: StepKind) {
        self.failing.lock().insert(kind);
    }

    /// Report the app port as held by PM2 entry `name`.
    pub fn hold_port(&self, pid: u32, name: &str) {
        *self.port_owner.lock() = Some((pid, name.to_string()));
    }

    pub fn heal(&self, kind: StepKind) {
        self.failing.lock().remove(&kind);
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.kinds.lock().clone()
    }

    pub fn count(&self, kind: StepKind) -> usize {
        self.kinds.lock().iter().filter(|k| **k == kind).count()
    }

    pub fn clear(&self) {
        self.kinds.lock().clear();
    }

    fn failed(&self, kind: StepKind) -> Option<CommandOutput> {
        self.failing.lock().contains(&kind).then(|| exit(1, ""))
    }
}

fn exit(code: u32, stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: stdout.to_string(),
        stderr: if code == 0 {
            String::new()
        } else {
            "simulated failure".to_string()
        },
    }
}

#[async_trait]
impl Executor for FakeRemote {
    async fn run(&self, step: &Step) -> Result<CommandOutput, ExecError> {
        self.kinds.lock().push(step.kind);
        if let Some(out) = self.failed(step.kind) {
            return Ok(out);
        }

        match step.kind {
            StepKind::InstallDependencies | StepKind::Build | StepKind::ReloadProcess => {
                Ok(exit(0, ""))
            }
            StepKind::HealthCheck => {
                let healthy = self.health.lock().pop_front().unwrap_or(true);
                Ok(exit(if healthy { 0 } else { 1 }, ""))
            }
            StepKind::PortQuery => Ok(match &*self.port_owner.lock() {
                // the free-port search finds nothing
                _ if step.command.starts_with("for p") => exit(0, ""),
                Some((pid, _)) => exit(0, &format!("{pid}\n")),
                // lsof: nothing listening
                None => exit(1, ""),
            }),
            StepKind::ProcessList => Ok(match &*self.port_owner.lock() {
                Some((pid, name)) => exit(0, &format!(r#"[{{"name":"{name}","pid":{pid}}}]"#)),
                None => exit(0, "[]"),
            }),
            _ => self.shell.run(step).await,
        }
    }

    async fn sync(
        &self,
        kind: StepKind,
        local: &Path,
        remote: &str,
        excludes: &[String],
    ) -> Result<CommandOutput, ExecError> {
        self.kinds.lock().push(kind);
        if let Some(out) = self.failed(kind) {
            return Ok(out);
        }
        self.shell.sync(kind, local, remote, excludes).await
    }

    async fn run_local(&self, step: &Step, _dir: &Path) -> Result<CommandOutput, ExecError> {
        self.kinds.lock().push(step.kind);
        Ok(self.failed(step.kind).unwrap_or_else(|| exit(0, "")))
    }
}
