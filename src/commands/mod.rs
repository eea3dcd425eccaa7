// ABOUTME: Command module aggregator for the shipnode CLI.
// ABOUTME: Re-exports one handler per subcommand.

mod connection;
mod deploy;
mod inspect;
mod maintenance;
mod rollback;

pub use deploy::{DeployFlags, deploy};
pub use inspect::{releases, status};
pub use maintenance::{migrate, unlock};
pub use rollback::rollback;
