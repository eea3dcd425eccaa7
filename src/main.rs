// ABOUTME: Entry point for the shipnode CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use shipnode::config::{self, Config};
use shipnode::error::Result;
use shipnode::output::{Output, OutputMode};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    if let Err(e) = run(cli, output).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

/// A loaded config and the project directory it describes.
struct Project {
    config: Config,
    dir: PathBuf,
}

fn load_project(explicit: Option<&Path>, destination: Option<&str>) -> Result<Project> {
    let cwd = env::current_dir()?;
    let (config, dir) = match explicit {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.clone());
            (Config::load(path)?, dir)
        }
        None => (Config::discover(&cwd)?, cwd),
    };

    // Apply destination overrides if specified
    let config = match destination {
        Some(dest) => config.for_destination(dest)?,
        None => config,
    };

    Ok(Project { config, dir })
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let explicit = cli.config.as_deref();

    match cli.command {
        Commands::Init {
            app,
            app_type,
            force,
        } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, app.as_deref(), app_type.map(Into::into), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Deploy {
            destination,
            dry_run,
            skip_build,
            force,
        } => {
            let project = load_project(explicit, destination.as_deref())?;
            let flags = commands::DeployFlags {
                dry_run,
                skip_build,
                force,
            };
            commands::deploy(project.config, &project.dir, flags, output).await
        }
        Commands::Rollback { steps, destination } => {
            let project = load_project(explicit, destination.as_deref())?;
            commands::rollback(project.config, steps, output).await
        }
        Commands::Releases { destination } => {
            let project = load_project(explicit, destination.as_deref())?;
            commands::releases(project.config, output).await
        }
        Commands::Migrate { destination } => {
            let project = load_project(explicit, destination.as_deref())?;
            commands::migrate(project.config, output).await
        }
        Commands::Unlock { destination } => {
            let project = load_project(explicit, destination.as_deref())?;
            commands::unlock(project.config, output).await
        }
        Commands::Status { destination } => {
            let project = load_project(explicit, destination.as_deref())?;
            commands::status(project.config, output).await
        }
    }
}
