// ABOUTME: Test support utilities.
// ABOUTME: A local fake remote host plus project and config builders.

#![allow(dead_code)]

pub mod fake_remote;

use shipnode::config::Config;
use std::path::Path;
use std::sync::Once;

pub use fake_remote::FakeRemote;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("shipnode=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Config for a backend app rooted at `root`, with instant health retries.
pub fn backend_config(root: &Path, extra: &str) -> Config {
    Config::from_yaml(&format!(
        "app: api\n\
         server: deploy@example.com\n\
         remote_path: {}\n\
         port: 3000\n\
         healthcheck:\n  retries: 2\n  interval: 0s\n\
         {}",
        root.display(),
        extra
    ))
    .unwrap()
}

pub fn frontend_config(root: &Path, extra: &str) -> Config {
    Config::from_yaml(&format!(
        "app: site\n\
         type: frontend\n\
         server: deploy@example.com\n\
         remote_path: {}\n\
         {}",
        root.display(),
        extra
    ))
    .unwrap()
}

/// A small Node project: sources plus things that must never be synced.
pub fn node_project(dir: &Path) {
    std::fs::write(dir.join("package.json"), "{\"name\":\"api\"}\n").unwrap();
    std::fs::write(dir.join("index.js"), "console.log('v1')\n").unwrap();
    std::fs::create_dir_all(dir.join("node_modules/left-pad")).unwrap();
    std::fs::write(dir.join("node_modules/left-pad/index.js"), "").unwrap();
    std::fs::write(dir.join(".env"), "SECRET=local\n").unwrap();
}

pub fn write_hook(project: &Path, name: &str, body: &str) {
    let hooks = project.join(".shipnode/hooks");
    std::fs::create_dir_all(&hooks).unwrap();
    std::fs::write(hooks.join(name), body).unwrap();
}

/// Release id `current` points at, read straight from the filesystem.
pub fn current_target(root: &Path) -> Option<String> {
    std::fs::read_link(root.join("current"))
        .ok()
        .map(|t| t.file_name().unwrap().to_string_lossy().into_owned())
}

/// `(id, status)` pairs from the ledger file.
pub fn ledger_pairs(root: &Path) -> Vec<(String, String)> {
    let Ok(text) = std::fs::read_to_string(root.join(".shipnode/releases.json")) else {
        return Vec::new();
    };
    let entries: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    entries
        .iter()
        .map(|e| {
            (
                e["id"].as_str().unwrap().to_string(),
                e["status"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

pub fn release_dirs(root: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root.join("releases")) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
