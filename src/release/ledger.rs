// ABOUTME: The release ledger: an append-ordered JSON history of release outcomes.
// ABOUTME: Pure queries for current/previous selection and retention live here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::types::ReleaseId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Success,
    Failed,
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseStatus::Success => write!(f, "success"),
            ReleaseStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerAction {
    #[default]
    Deploy,
    Rollback,
}

impl LedgerAction {
    fn is_deploy(&self) -> bool {
        *self == LedgerAction::Deploy
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: ReleaseId,
    pub status: ReleaseStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "LedgerAction::is_deploy")]
    pub action: LedgerAction,
}

impl LedgerEntry {
    pub fn new(id: ReleaseId, status: ReleaseStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            status,
            timestamp,
            action: LedgerAction::Deploy,
        }
    }

    pub fn rollback(id: ReleaseId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            status: ReleaseStatus::Success,
            timestamp,
            action: LedgerAction::Rollback,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    /// Parse ledger JSON. Blank input is an empty ledger.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recently appended entry.
    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Id of the most recently appended successful entry.
    pub fn latest_success(&self) -> Option<&ReleaseId> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.status == ReleaseStatus::Success)
            .map(|e| &e.id)
    }

    /// Highest id ever recorded, regardless of outcome.
    pub fn max_id(&self) -> Option<&ReleaseId> {
        self.entries.iter().map(|e| &e.id).max()
    }

    /// Status of the latest entry for `id`.
    pub fn status_of(&self, id: &ReleaseId) -> Option<ReleaseStatus> {
        self.entries
            .iter()
            .rev()
            .find(|e| &e.id == id)
            .map(|e| e.status)
    }

    /// The most recent distinct successful release before `current`.
    pub fn previous_release(&self, current: Option<&ReleaseId>) -> Option<ReleaseId> {
        self.nth_success_back(current, 1)
    }

    /// The `n`-th distinct successful release back from `current`, in ledger order.
    ///
    /// `n == 0` and a missing `current` both yield `None`.
    pub fn nth_success_back(&self, current: Option<&ReleaseId>, n: usize) -> Option<ReleaseId> {
        n.checked_sub(1)
            .and_then(|i| self.successes_before(current?).into_iter().nth(i))
    }

    /// Distinct successful releases before `current`, most recent first.
    ///
    /// The walk starts at the last entry for `current` (or the end of the
    /// ledger if `current` was never recorded) and skips `current` itself.
    pub fn successes_before(&self, current: &ReleaseId) -> Vec<ReleaseId> {
        let start = self
            .entries
            .iter()
            .rposition(|e| &e.id == current)
            .unwrap_or(self.entries.len());

        let mut seen = HashSet::new();
        self.entries[..start]
            .iter()
            .rev()
            .filter(|e| e.status == ReleaseStatus::Success && &e.id != current)
            .filter(|e| seen.insert(e.id.clone()))
            .map(|e| e.id.clone())
            .collect()
    }
}

/// Release directories `cleanup(keep_n)` should delete.
///
/// The current release is never a candidate and counts toward `keep_n`,
/// which is clamped to at least 1. Survivors are the newest by id.
pub fn cleanup_candidates(
    releases: &[ReleaseId],
    current: Option<&ReleaseId>,
    keep_n: usize,
) -> Vec<ReleaseId> {
    let keep_n = keep_n.max(1);

    let mut others: Vec<&ReleaseId> = releases.iter().filter(|r| Some(*r) != current).collect();
    others.sort_unstable_by(|a, b| b.cmp(a));
    others.dedup();

    let current_on_disk = current.is_some_and(|c| releases.contains(c));
    let keep_others = if current_on_disk { keep_n - 1 } else { keep_n };

    others.into_iter().skip(keep_others).cloned().collect()
}
