// ABOUTME: Validated domain types for release identity and process naming.
// ABOUTME: Parsing happens once at the edge so the rest of the crate trusts these values.

mod app_name;
mod release_id;

pub use app_name::{AppName, AppNameError};
pub use release_id::{ReleaseId, ReleaseIdError};
