// ABOUTME: Structured remote steps: a shell command tagged with what it does.
// ABOUTME: Step kinds drive error attribution, dry-run rendering, and test doubles.

use std::fmt;

/// What a step does, independent of the shell text that does it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    EnsureStructure,
    CreateRelease,
    SyncFiles,
    InstallDependencies,
    Build,
    LocalBuild,
    LinkShared,
    LinkBuildEnv,
    WriteEcosystem,
    UploadHook,
    RunHook,
    SwitchCurrent,
    ReloadProcess,
    HealthCheck,
    PortQuery,
    ProcessList,
    ReadCurrent,
    ListReleases,
    ReadLedger,
    WriteLedger,
    RemoveRelease,
    AcquireLock,
    ReadLock,
    ReleaseLock,
    DetectLayout,
    MigrateFiles,
}

impl StepKind {
    /// Short label used in progress output and errors.
    pub fn label(self) -> &'static str {
        match self {
            StepKind::EnsureStructure => "ensure structure",
            StepKind::CreateRelease => "create release",
            StepKind::SyncFiles => "sync files",
            StepKind::InstallDependencies => "install dependencies",
            StepKind::Build => "build",
            StepKind::LocalBuild => "local build",
            StepKind::LinkShared => "link shared files",
            StepKind::LinkBuildEnv => "link env into build output",
            StepKind::WriteEcosystem => "write ecosystem file",
            StepKind::UploadHook => "upload hook",
            StepKind::RunHook => "run hook",
            StepKind::SwitchCurrent => "switch current",
            StepKind::ReloadProcess => "reload process",
            StepKind::HealthCheck => "health check",
            StepKind::PortQuery => "port query",
            StepKind::ProcessList => "list processes",
            StepKind::ReadCurrent => "read current",
            StepKind::ListReleases => "list releases",
            StepKind::ReadLedger => "read ledger",
            StepKind::WriteLedger => "write ledger",
            StepKind::RemoveRelease => "remove release",
            StepKind::AcquireLock => "acquire lock",
            StepKind::ReadLock => "read lock",
            StepKind::ReleaseLock => "release lock",
            StepKind::DetectLayout => "detect layout",
            StepKind::MigrateFiles => "migrate files",
        }
    }

    /// Whether the step changes remote state.
    pub fn is_mutating(self) -> bool {
        !matches!(
            self,
            StepKind::HealthCheck
                | StepKind::PortQuery
                | StepKind::ProcessList
                | StepKind::ReadCurrent
                | StepKind::ListReleases
                | StepKind::ReadLedger
                | StepKind::ReadLock
                | StepKind::DetectLayout
        )
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single shell command run through an [`Executor`](super::Executor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub command: String,
    /// Bytes fed to the command's standard input. Payloads go here rather
    /// than into `command`, which is bounded by the kernel's argument limit.
    pub stdin: Option<String>,
}

impl Step {
    pub fn new(kind: StepKind, command: impl Into<String>) -> Self {
        Self {
            kind,
            command: command.into(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.command)?;
        if let Some(input) = &self.stdin {
            write!(f, " <<< ({} bytes)", input.len())?;
        }
        Ok(())
    }
}

/// Quote a value for interpolation into a POSIX shell command.
pub fn quote(value: &str) -> String {
    shell_escape::unix::escape(value.into()).into_owned()
}
