// ABOUTME: Configuration types and parsing for shipnode.yml.
// ABOUTME: Handles YAML parsing, validation, defaults, and destination merging.

mod healthcheck;
mod init;
mod server;

pub use healthcheck::HealthcheckConfig;
pub use init::init_config;
pub use server::ServerConfig;

use crate::error::{Error, Result};
use crate::types::AppName;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "shipnode.yml";
pub const CONFIG_FILENAME_ALT: &str = "shipnode.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".shipnode/config.yml";

/// Hook scripts looked up in the project when none are configured.
pub const DEFAULT_PRE_DEPLOY_HOOK: &str = ".shipnode/hooks/pre-deploy";
pub const DEFAULT_POST_DEPLOY_HOOK: &str = ".shipnode/hooks/post-deploy";

/// Paths never synced to the server, in addition to `exclude`.
const BASE_EXCLUDES: &[&str] = &[".git", "node_modules", ".env", ".shipnode", "shipnode.yml"];

/// Local user name: recorded in the deploy lock, and the SSH user when none is configured.
pub fn local_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    /// Node.js process managed by PM2.
    #[default]
    Backend,
    /// Static build output served by the reverse proxy.
    Frontend,
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppType::Backend => write!(f, "backend"),
            AppType::Frontend => write!(f, "frontend"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppName,

    #[serde(rename = "type", default)]
    pub app_type: AppType,

    #[serde(deserialize_with = "server::deserialize_server")]
    pub server: ServerConfig,

    pub remote_path: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default = "default_zero_downtime")]
    pub zero_downtime: bool,

    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,

    #[serde(default = "default_node_env")]
    pub node_env: String,

    #[serde(default = "default_install_command")]
    pub install_command: String,

    #[serde(default)]
    pub build_command: Option<String>,

    #[serde(default = "default_start_command")]
    pub start_command: String,

    /// Build output directory for linking the shared env file into.
    #[serde(default)]
    pub build_dir: Option<String>,

    /// Local build output synced for frontends.
    #[serde(default = "default_dist_dir")]
    pub dist_dir: String,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub healthcheck: HealthcheckConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub hooks: HooksConfig,

    #[serde(default)]
    pub destinations: HashMap<String, Destination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after: default_stale_after(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub pre_deploy: Option<PathBuf>,
    #[serde(default)]
    pub post_deploy: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Destination {
    #[serde(default, deserialize_with = "server::deserialize_server_option")]
    pub server: Option<ServerConfig>,

    #[serde(default)]
    pub remote_path: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub zero_downtime: Option<bool>,
}

fn default_zero_downtime() -> bool {
    true
}

fn default_keep_releases() -> usize {
    5
}

fn default_node_env() -> String {
    "production".to_string()
}

fn default_install_command() -> String {
    "npm ci".to_string()
}

fn default_start_command() -> String {
    "npm start".to_string()
}

fn default_dist_dir() -> String {
    "dist".to_string()
}

fn default_stale_after() -> Duration {
    Duration::from_secs(3600)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.app_type == AppType::Backend && self.port.is_none() {
            return Err(Error::InvalidConfig(
                "backend apps require a port".to_string(),
            ));
        }

        let root = self.remote_path.trim_end_matches('/');
        if !self.remote_path.starts_with('/') || root.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "remote_path must be an absolute path below /: {}",
                self.remote_path
            )));
        }

        if self.keep_releases == 0 {
            return Err(Error::InvalidConfig(
                "keep_releases must be at least 1".to_string(),
            ));
        }

        if self.healthcheck.retries == 0 {
            return Err(Error::InvalidConfig(
                "healthcheck.retries must be at least 1".to_string(),
            ));
        }

        if !self.healthcheck.path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "healthcheck.path must start with '/': {}",
                self.healthcheck.path
            )));
        }

        Ok(())
    }

    pub fn for_destination(&self, name: &str) -> Result<Config> {
        let dest = self
            .destinations
            .get(name)
            .ok_or_else(|| Error::UnknownDestination(name.to_string()))?;

        let mut merged = self.clone();

        if let Some(ref server) = dest.server {
            merged.server = server.clone();
        }
        if let Some(ref remote_path) = dest.remote_path {
            merged.remote_path = remote_path.clone();
        }
        if dest.port.is_some() {
            merged.port = dest.port;
        }
        if dest.domain.is_some() {
            merged.domain = dest.domain.clone();
        }
        if let Some(zero_downtime) = dest.zero_downtime {
            merged.zero_downtime = zero_downtime;
        }

        merged.validate()?;
        Ok(merged)
    }

    /// Remote root with any trailing slash removed.
    pub fn remote_root(&self) -> &str {
        self.remote_path.trim_end_matches('/')
    }

    /// Patterns excluded from file sync.
    pub fn sync_excludes(&self) -> Vec<String> {
        BASE_EXCLUDES
            .iter()
            .map(|s| s.to_string())
            .chain(self.exclude.iter().cloned())
            .collect()
    }

    /// Pre-deploy hook script in `project_dir`, if one exists.
    pub fn pre_deploy_hook(&self, project_dir: &Path) -> Option<PathBuf> {
        hook_path(
            project_dir,
            self.hooks.pre_deploy.as_deref(),
            DEFAULT_PRE_DEPLOY_HOOK,
        )
    }

    /// Post-deploy hook script in `project_dir`, if one exists.
    pub fn post_deploy_hook(&self, project_dir: &Path) -> Option<PathBuf> {
        hook_path(
            project_dir,
            self.hooks.post_deploy.as_deref(),
            DEFAULT_POST_DEPLOY_HOOK,
        )
    }

    pub fn template() -> Self {
        Config {
            app: AppName::new("my-app").unwrap_or_else(|_| unreachable!()),
            app_type: AppType::Backend,
            server: ServerConfig {
                host: "server.example.com".to_string(),
                port: 22,
                user: Some("deploy".to_string()),
                key_path: None,
                known_hosts_path: None,
                trust_first_connection: true,
                command_timeout: Duration::from_secs(600),
            },
            remote_path: "/var/www/my-app".to_string(),
            port: Some(3000),
            domain: None,
            zero_downtime: default_zero_downtime(),
            keep_releases: default_keep_releases(),
            node_env: default_node_env(),
            install_command: default_install_command(),
            build_command: None,
            start_command: default_start_command(),
            build_dir: None,
            dist_dir: default_dist_dir(),
            exclude: vec![],
            healthcheck: HealthcheckConfig::default(),
            lock: LockConfig::default(),
            hooks: HooksConfig::default(),
            destinations: HashMap::new(),
        }
    }
}

fn hook_path(project_dir: &Path, configured: Option<&Path>, default: &str) -> Option<PathBuf> {
    let path = match configured {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => project_dir.join(p),
        None => project_dir.join(default),
    };
    path.is_file().then_some(path)
}
