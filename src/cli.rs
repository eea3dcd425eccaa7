// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use shipnode::config::AppType;

#[derive(Parser)]
#[command(name = "shipnode")]
#[command(about = "Zero-downtime release deployment for Node.js apps over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result (for CI)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of discovering shipnode.yml
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AppTypeArg {
    Backend,
    Frontend,
}

impl From<AppTypeArg> for AppType {
    fn from(arg: AppTypeArg) -> Self {
        match arg {
            AppTypeArg::Backend => AppType::Backend,
            AppTypeArg::Frontend => AppType::Frontend,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new shipnode.yml configuration file
    Init {
        /// App name (also the PM2 process name)
        #[arg(long)]
        app: Option<String>,

        /// Backend (PM2-managed) or frontend (static files)
        #[arg(long = "type", value_enum)]
        app_type: Option<AppTypeArg>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Deploy the app to the configured server
    Deploy {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,

        /// Print every planned step without connecting
        #[arg(long)]
        dry_run: bool,

        /// Sync existing frontend build output without building
        #[arg(long)]
        skip_build: bool,

        /// Break a deploy lock held by someone else
        #[arg(long)]
        force: bool,
    },

    /// Switch back to an earlier successful release
    Rollback {
        /// How many successful releases to go back
        #[arg(default_value_t = 1)]
        steps: usize,

        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// List releases on the server
    Releases {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Convert an in-place deployment to release directories
    Migrate {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Remove the deploy lock
    Unlock {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Show the current release, recent history, and lock holder
    Status {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,
    },
}
