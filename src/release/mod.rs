// ABOUTME: Release store: on-disk release layout and the JSON release ledger.
// ABOUTME: Shared by deploy, rollback, migrate, and the read-only commands.

mod layout;
mod ledger;
mod store;

pub use layout::RemoteLayout;
pub use ledger::{Ledger, LedgerAction, LedgerEntry, ReleaseStatus, cleanup_candidates};
pub use store::{CleanupReport, ReleaseRow, ReleaseStore, StoreError, StoreResult};
