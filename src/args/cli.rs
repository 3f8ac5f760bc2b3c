//! Root command for the CLI.
//!
//! The commands are defined in the [`Command`](super::Command) enum.
use std::path::PathBuf;

use clap::Args;
use url::Url;

use crate::formatting::Format;

use super::Command;

/// Create virtual machines and scale sets from a single deployment
#[derive(Args)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global_args: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Implement the Parser trait to allow us to use the Cli struct as a root command.
///
/// This allows us to invoke `Cli::parse()` to parse the CLI arguments.
impl clap::Parser for Cli {}

impl Cli {
    /// Setting the binary name changes the usage string in the help text.
    fn new_command() -> clap::Command {
        clap::Command::new(env!("CARGO_PKG_NAME")).bin_name(env!("CARGO_PKG_NAME"))
    }
}

/// Manually implement the CommandFactory trait so help and usage always name the binary,
/// even when it is invoked through a symlink or a wrapper script.
impl clap::CommandFactory for Cli {
    fn command() -> clap::Command {
        // This based on what the Parse derive macro generates.
        // The call to `Cli::new_command()` is what's changed
        let __clap_app = Cli::new_command();
        <Self as clap::Args>::augment_args(__clap_app)
    }

    fn command_for_update() -> clap::Command {
        let __clap_app = Cli::new_command();
        <Self as clap::Args>::augment_args_for_update(__clap_app)
    }
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable debug logging.
    ///
    /// Setting this flag will set the log level to debug and only show logs from this crate.
    ///
    /// The log level can also be overridden by setting the `VMFORGE_LOG` environment variable.
    /// If the `VMFORGE_LOG_ALL` environment variable is set, it will show logs from all crates at the specified level.
    #[arg(global = true, hide = true, long, short = 'D', default_value = "false")]
    pub debug: bool,

    /// Output format.
    #[arg(global = true, long = "output", short = 'o')]
    pub format: Option<Format>,

    /// Subscription to create resources in.
    #[arg(global = true, long, env = "VMFORGE_SUBSCRIPTION")]
    pub subscription: Option<String>,

    /// Bearer token for the management API.
    #[arg(global = true, long, env = "VMFORGE_ACCESS_TOKEN", hide = true, hide_env_values = true)]
    pub access_token: Option<String>,

    /// Management API endpoint, defaults to https://management.azure.com/.
    #[arg(global = true, long, env = "VMFORGE_ENDPOINT")]
    pub endpoint: Option<Url>,

    /// JSON file with endpoint, alias document, poll interval and api version overrides.
    #[arg(global = true, long, env = "VMFORGE_CONFIG")]
    pub config: Option<PathBuf>,
}
