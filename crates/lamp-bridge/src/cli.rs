//! Clap derive structures for the `lamp-bridge` binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// lamp-bridge -- JSON-RPC bridge for EG2-S lighting gateways
#[derive(Debug, Parser)]
#[command(
    name = "lamp-bridge",
    version,
    about = "Bridge home-automation controllers to EG2-S lighting gateways",
    long_about = "Serves a JSON-RPC endpoint that home-automation controllers call to \
        set scenes, set channel levels and query channel levels on an EG2-S \
        lighting gateway over its WebSocket interface. State changes reported \
        by the gateway are forwarded to a webhook.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "LAMP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the JSON-RPC endpoint
    Serve(ServeArgs),

    /// Inspect or create the config file
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides `listen` from the config)
    #[arg(long, short = 'l')]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Print the effective config with secrets hidden
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
