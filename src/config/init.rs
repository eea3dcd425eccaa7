// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates shipnode.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::AppName;

use super::{AppType, CONFIG_FILENAME, Config};

pub fn init_config(
    dir: &Path,
    app: Option<&str>,
    app_type: Option<AppType>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(name) = app {
        config.app = AppName::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.remote_path = format!("/var/www/{}", config.app);
    }

    if let Some(t) = app_type {
        config.app_type = t;
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let port_line = match config.app_type {
        AppType::Backend => format!("port: {}\n", config.port.unwrap_or(3000)),
        AppType::Frontend => String::new(),
    };
    format!(
        r#"app: {app}
type: {app_type}
server: {user}@{host}:{ssh_port}
remote_path: {remote_path}
{port_line}zero_downtime: true
keep_releases: {keep}

# healthcheck:
#   path: /health
#   timeout: 5s
#   retries: 10
#   interval: 3s

# lock:
#   stale_after: 1h

# hooks:
#   pre_deploy: .shipnode/hooks/pre-deploy
#   post_deploy: .shipnode/hooks/post-deploy
"#,
        app = config.app,
        app_type = config.app_type,
        user = config.server.user.as_deref().unwrap_or("deploy"),
        host = config.server.host,
        ssh_port = config.server.port,
        remote_path = config.remote_path,
        keep = config.keep_releases,
    )
}
