// ABOUTME: Release store: remote directory layout, current symlink, and ledger I/O.
// ABOUTME: Every operation is a structured step run through an Executor.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::layout::RemoteLayout;
use super::ledger::{Ledger, LedgerEntry, ReleaseStatus, cleanup_candidates};
use crate::remote::{ExecError, Executor, Step, StepKind, quote};
use crate::types::ReleaseId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("release ledger {path} is corrupt: {source}")]
    CorruptLedger {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize release ledger: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("current points at an unrecognized target: {0}")]
    InvalidCurrent(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of a best-effort cleanup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<ReleaseId>,
    pub failed: Vec<(ReleaseId, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One release directory as shown by `releases` and `status`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReleaseRow {
    pub id: ReleaseId,
    /// Latest ledger outcome; `None` for directories the ledger never saw.
    pub status: Option<ReleaseStatus>,
    pub current: bool,
}

/// Releases, the `current` pointer, and the ledger under one remote root.
pub struct ReleaseStore<'a, E: Executor + ?Sized> {
    exec: &'a E,
    layout: RemoteLayout,
}

impl<'a, E: Executor + ?Sized> ReleaseStore<'a, E> {
    pub fn new(exec: &'a E, layout: RemoteLayout) -> Self {
        Self { exec, layout }
    }

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    pub fn release_path(&self, id: &ReleaseId) -> String {
        self.layout.release_dir(id)
    }

    /// Create `releases/`, `shared/`, `shared/logs/` and `.shipnode/` if missing.
    pub async fn ensure_structure(&self) -> StoreResult<()> {
        let command = format!(
            "mkdir -p {} {} {} {}",
            quote(&self.layout.releases_dir()),
            quote(&self.layout.shared_dir()),
            quote(&self.layout.logs_dir()),
            quote(&self.layout.meta_dir()),
        );
        self.exec
            .run_checked(&Step::new(StepKind::EnsureStructure, command))
            .await?;
        Ok(())
    }

    /// Create the directory for a new release.
    pub async fn create_release(&self, id: &ReleaseId) -> StoreResult<String> {
        let path = self.release_path(id);
        self.exec
            .run_checked(&Step::new(
                StepKind::CreateRelease,
                format!("mkdir -p {}", quote(&path)),
            ))
            .await?;
        Ok(path)
    }

    /// Whether the release directory for `id` exists.
    pub async fn release_exists(&self, id: &ReleaseId) -> StoreResult<bool> {
        let output = self
            .exec
            .run(&Step::new(
                StepKind::ListReleases,
                format!("test -d {}", quote(&self.release_path(id))),
            ))
            .await?;
        Ok(output.success())
    }

    /// The release `current` points at, or `None` when the link is absent.
    pub async fn current_release(&self) -> StoreResult<Option<ReleaseId>> {
        let link = quote(&self.layout.current_link());
        let output = self
            .exec
            .run_checked(&Step::new(
                StepKind::ReadCurrent,
                format!("if [ -L {link} ]; then readlink {link}; fi"),
            ))
            .await?;

        let target = output.stdout.trim();
        if target.is_empty() {
            return Ok(None);
        }

        let name = target.trim_end_matches('/').rsplit('/').next().unwrap_or(target);
        ReleaseId::parse(name)
            .map(Some)
            .map_err(|_| StoreError::InvalidCurrent(target.to_string()))
    }

    pub async fn read_ledger(&self) -> StoreResult<Ledger> {
        let path = self.layout.ledger_file();
        let file = quote(&path);
        let output = self
            .exec
            .run_checked(&Step::new(
                StepKind::ReadLedger,
                format!("if [ -f {file} ]; then cat {file}; fi"),
            ))
            .await?;

        Ledger::from_json(&output.stdout)
            .map_err(|source| StoreError::CorruptLedger { path, source })
    }

    /// The most recent successful release before the current one.
    pub async fn previous_release(&self) -> StoreResult<Option<ReleaseId>> {
        let current = self.current_release().await?;
        let ledger = self.read_ledger().await?;
        Ok(ledger.previous_release(current.as_ref()))
    }

    /// The newest release the ledger records as successful whose directory
    /// still exists. This is where a failed deploy falls back to.
    pub async fn latest_live_success(&self) -> StoreResult<Option<ReleaseId>> {
        let ledger = self.read_ledger().await?;
        let mut checked = Vec::new();
        for entry in ledger.entries().iter().rev() {
            if entry.status != ReleaseStatus::Success || checked.contains(&entry.id) {
                continue;
            }
            if self.release_exists(&entry.id).await? {
                return Ok(Some(entry.id.clone()));
            }
            tracing::warn!("release {} is recorded as successful but missing on disk", entry.id);
            checked.push(entry.id.clone());
        }
        Ok(None)
    }

    /// Release directory names that parse as release ids, ascending.
    pub async fn list_releases(&self) -> StoreResult<Vec<ReleaseId>> {
        let dir = quote(&self.layout.releases_dir());
        let output = self
            .exec
            .run_checked(&Step::new(
                StepKind::ListReleases,
                format!("if [ -d {dir} ]; then ls -1 {dir}; fi"),
            ))
            .await?;

        let mut ids: Vec<ReleaseId> = output
            .stdout
            .lines()
            .filter_map(|line| ReleaseId::parse(line.trim()).ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Releases on disk, newest first, annotated from the ledger.
    pub async fn release_rows(&self) -> StoreResult<Vec<ReleaseRow>> {
        let current = self.current_release().await?;
        let ledger = self.read_ledger().await?;
        let mut ids = self.list_releases().await?;
        ids.reverse();

        Ok(ids
            .into_iter()
            .map(|id| ReleaseRow {
                status: ledger.status_of(&id),
                current: current.as_ref() == Some(&id),
                id,
            })
            .collect())
    }

    /// A fresh id from the wall clock, strictly after every known release.
    pub async fn next_release_id(&self) -> StoreResult<ReleaseId> {
        self.next_release_id_at(Utc::now()).await
    }

    pub async fn next_release_id_at(&self, now: DateTime<Utc>) -> StoreResult<ReleaseId> {
        let ledger = self.read_ledger().await?;
        let on_disk = self.list_releases().await?;
        let latest = ledger.max_id().into_iter().chain(on_disk.last()).max();
        Ok(ReleaseId::next_after(now, latest))
    }

    /// Point `current` at `id` by renaming a fresh symlink over it.
    pub async fn switch_current(&self, id: &ReleaseId) -> StoreResult<()> {
        let tmp = format!("current.tmp-{}", id);
        let command = format!(
            "cd {root} && ln -sfn {target} {tmp} && mv -Tf {tmp} current",
            root = quote(self.layout.root()),
            target = quote(&RemoteLayout::release_link_target(id)),
            tmp = quote(&tmp),
        );
        self.exec
            .run_checked(&Step::new(StepKind::SwitchCurrent, command))
            .await?;
        tracing::debug!("current -> releases/{}", id);
        Ok(())
    }

    /// Remove the `current` link. Used when a failed deploy has no
    /// successful release to fall back to.
    pub async fn clear_current(&self) -> StoreResult<()> {
        self.exec
            .run_checked(&Step::new(
                StepKind::SwitchCurrent,
                format!("rm -f {}", quote(&self.layout.current_link())),
            ))
            .await?;
        tracing::debug!("current removed");
        Ok(())
    }

    /// Append `{id, status}` to the ledger.
    pub async fn record(&self, id: &ReleaseId, status: ReleaseStatus) -> StoreResult<()> {
        self.append(LedgerEntry::new(id.clone(), status, Utc::now()))
            .await
    }

    /// Append an arbitrary entry, rewriting the ledger through a temp file.
    pub async fn append(&self, entry: LedgerEntry) -> StoreResult<()> {
        let mut ledger = self.read_ledger().await?;
        ledger.push(entry);
        self.write_ledger(&ledger).await
    }

    async fn write_ledger(&self, ledger: &Ledger) -> StoreResult<()> {
        let mut json = ledger.to_json().map_err(StoreError::Serialize)?;
        json.push('\n');
        let path = self.layout.ledger_file();
        let tmp = format!("{}.tmp", path);
        // The ledger grows without bound; it travels on stdin, never argv.
        let command = format!(
            "cat > {tmp} && mv -f {tmp} {path}",
            tmp = quote(&tmp),
            path = quote(&path),
        );
        self.exec
            .run_checked(&Step::new(StepKind::WriteLedger, command).with_stdin(json))
            .await?;
        Ok(())
    }

    /// Delete releases beyond the newest `keep_n` (current included).
    ///
    /// Each directory is removed independently; failures are collected in
    /// the report rather than aborting the rest.
    pub async fn cleanup(&self, keep_n: usize) -> StoreResult<CleanupReport> {
        let current = self.current_release().await?;
        let releases = self.list_releases().await?;
        let mut report = CleanupReport::default();

        for id in cleanup_candidates(&releases, current.as_ref(), keep_n) {
            let step = Step::new(
                StepKind::RemoveRelease,
                format!("rm -rf {}", quote(&self.release_path(&id))),
            );
            match self.exec.run_checked(&step).await {
                Ok(_) => report.removed.push(id),
                Err(e) => {
                    tracing::warn!("failed to remove release {}: {}", id, e);
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
