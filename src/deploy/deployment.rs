// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: Carries the config snapshot and release identity through every state.

use std::path::PathBuf;

use crate::config::Config;
use crate::hooks::HookContext;
use crate::release::RemoteLayout;
use crate::types::ReleaseId;

use super::state::Initialized;
use super::strategy::DeployVariant;

/// Local project being deployed.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub project_dir: PathBuf,
    /// Skip the local frontend build and sync existing output.
    pub skip_build: bool,
}

impl SourceTree {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            skip_build: false,
        }
    }

    pub fn skip_build(mut self, skip: bool) -> Self {
        self.skip_build = skip;
        self
    }
}

/// A zero-downtime deployment in progress, parameterized by its current state.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) config: Config,
    pub(crate) layout: RemoteLayout,
    pub(crate) release: ReleaseId,
    pub(crate) previous: Option<ReleaseId>,
    pub(crate) health_attempts: u32,
    pub(crate) state: S,
}

impl Deployment<Initialized> {
    /// Start a deployment of `release`. `previous` is the newest successful
    /// release still on disk; a failed deploy returns `current` to it.
    pub fn new(config: Config, release: ReleaseId, previous: Option<ReleaseId>) -> Self {
        let layout = RemoteLayout::new(config.remote_root());
        Deployment {
            config,
            layout,
            release,
            previous,
            health_attempts: 0,
            state: Initialized,
        }
    }
}

impl<S> Deployment<S> {
    pub fn release(&self) -> &ReleaseId {
        &self.release
    }

    /// Newest successful release this deploy falls back to.
    pub fn previous(&self) -> Option<&ReleaseId> {
        self.previous.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    pub fn release_dir(&self) -> String {
        self.layout.release_dir(&self.release)
    }

    pub fn variant(&self) -> DeployVariant {
        DeployVariant::for_config(&self.config)
    }

    /// Health checks spent so far.
    pub fn health_attempts(&self) -> u32 {
        self.health_attempts
    }

    pub fn hook_context(&self) -> HookContext {
        HookContext {
            app: self.config.app.clone(),
            release: Some(self.release.clone()),
            release_dir: self.release_dir(),
            remote_root: self.layout.root().to_string(),
            env_file: self.layout.shared_env(),
            previous_release: self.previous.clone(),
            node_env: self.config.node_env.clone(),
        }
    }
}
