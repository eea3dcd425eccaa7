// ABOUTME: Remote filesystem layout for one application root.
// ABOUTME: Pure path computation; nothing here touches the server.

use crate::types::ReleaseId;

pub const RELEASES_DIR: &str = "releases";
pub const CURRENT_LINK: &str = "current";
pub const SHARED_DIR: &str = "shared";
pub const META_DIR: &str = ".shipnode";

/// Absolute paths under `<remote_root>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    root: String,
}

impl RemoteLayout {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let trimmed = root.trim_end_matches('/');
        Self {
            root: if trimmed.is_empty() { root } else { trimmed.to_string() },
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn join(&self, rel: &str) -> String {
        format!("{}/{}", self.root, rel)
    }

    pub fn releases_dir(&self) -> String {
        self.join(RELEASES_DIR)
    }

    /// `releases/<id>` relative to the root, as stored in the `current` link.
    pub fn release_link_target(id: &ReleaseId) -> String {
        format!("{}/{}", RELEASES_DIR, id)
    }

    pub fn release_dir(&self, id: &ReleaseId) -> String {
        self.join(&Self::release_link_target(id))
    }

    pub fn current_link(&self) -> String {
        self.join(CURRENT_LINK)
    }

    pub fn shared_dir(&self) -> String {
        self.join(SHARED_DIR)
    }

    pub fn shared_env(&self) -> String {
        self.join("shared/.env")
    }

    pub fn logs_dir(&self) -> String {
        self.join("shared/logs")
    }

    pub fn ecosystem_file(&self) -> String {
        self.join("shared/ecosystem.config.cjs")
    }

    pub fn meta_dir(&self) -> String {
        self.join(META_DIR)
    }

    pub fn lock_file(&self) -> String {
        self.join(".shipnode/deploy.lock")
    }

    pub fn ledger_file(&self) -> String {
        self.join(".shipnode/releases.json")
    }

    pub fn hooks_dir(&self) -> String {
        self.join(".shipnode/hooks")
    }

    pub fn hook_file(&self, name: &str) -> String {
        format!("{}/{}", self.hooks_dir(), name)
    }
}
