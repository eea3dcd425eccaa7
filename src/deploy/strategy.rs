// ABOUTME: Deploy variant selection: app type crossed with deploy mode.
// ABOUTME: The orchestrator branches on this closed set and nothing else.

use std::fmt;

use crate::config::{AppType, Config};

/// How releases are laid out on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode {
    /// Release directories behind an atomically switched `current` link.
    ZeroDowntime,
    /// Files synced straight into the remote root.
    Legacy,
}

/// What gets deployed and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployVariant {
    pub app_type: AppType,
    pub mode: DeployMode,
}

impl DeployVariant {
    pub fn for_config(config: &Config) -> Self {
        Self {
            app_type: config.app_type,
            mode: if config.zero_downtime {
                DeployMode::ZeroDowntime
            } else {
                DeployMode::Legacy
            },
        }
    }

    pub fn is_backend(&self) -> bool {
        self.app_type == AppType::Backend
    }

    pub fn is_zero_downtime(&self) -> bool {
        self.mode == DeployMode::ZeroDowntime
    }
}

impl fmt::Display for DeployVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            DeployMode::ZeroDowntime => "zero-downtime",
            DeployMode::Legacy => "legacy",
        };
        write!(f, "{} ({})", self.app_type, mode)
    }
}
