// ABOUTME: PM2 ecosystem file generation and process reload steps.
// ABOUTME: The file is regenerated on every deploy into shared/ecosystem.config.cjs.

use serde_json::json;

use crate::config::Config;
use crate::release::RemoteLayout;
use crate::remote::{Step, StepKind, quote};

/// Render `module.exports = {...}` for the app.
///
/// `cwd` is `<root>/current` for release-based deploys and the root itself
/// for legacy deploys.
pub fn render(config: &Config, layout: &RemoteLayout, zero_downtime: bool) -> String {
    let cwd = if zero_downtime {
        layout.current_link()
    } else {
        layout.root().to_string()
    };

    let mut words = config.start_command.split_whitespace();
    let script = words.next().unwrap_or("npm");
    let args: Vec<&str> = words.collect();
    let logs = layout.logs_dir();

    let mut env = serde_json::Map::new();
    env.insert("NODE_ENV".to_string(), json!(config.node_env));
    if let Some(port) = config.port {
        env.insert("PORT".to_string(), json!(port));
    }

    let app = json!({
        "name": config.app.as_str(),
        "cwd": cwd,
        "script": script,
        "args": args.join(" "),
        "env": env,
        "out_file": format!("{}/{}-out.log", logs, config.app),
        "error_file": format!("{}/{}-error.log", logs, config.app),
        "merge_logs": true,
        "time": true,
    });

    let body = serde_json::to_string_pretty(&json!({ "apps": [app] }))
        .unwrap_or_else(|_| "{\"apps\": []}".to_string());
    format!("module.exports = {};\n", body)
}

/// Step writing the rendered ecosystem file.
pub fn write_step(config: &Config, layout: &RemoteLayout, zero_downtime: bool) -> Step {
    let path = layout.ecosystem_file();
    let tmp = format!("{}.tmp", path);
    Step::new(
        StepKind::WriteEcosystem,
        format!(
            "printf '%s' {content} > {tmp} && mv -f {tmp} {path}",
            content = quote(&render(config, layout, zero_downtime)),
            tmp = quote(&tmp),
            path = quote(&path),
        ),
    )
}

/// Step starting or reloading the app from the ecosystem file.
pub fn reload_step(config: &Config, layout: &RemoteLayout) -> Step {
    Step::new(
        StepKind::ReloadProcess,
        format!(
            "pm2 startOrReload {} --only {} --update-env && pm2 save",
            quote(&layout.ecosystem_file()),
            quote(config.app.as_str()),
        ),
    )
}
