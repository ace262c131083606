//! Main entrypoint for the ember node binary.

#![warn(missing_debug_implementations, unreachable_pub, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod node;

const ABOUT: &str = "
ember is a full Ethereum protocol node: it discovers peers over devp2p,
establishes encrypted RLPx sessions, synchronizes and validates the block
chain, and executes transactions on its own EVM, converging on the same
state roots as every other conforming client.
";

/// The node's CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(about = ABOUT, version)]
pub(crate) struct EmberCli {
    /// Chain preset to follow.
    #[arg(long, default_value = "ropsten")]
    pub chain: String,
    /// Path to a custom chain specification, overriding --chain.
    #[arg(long)]
    pub chain_file: Option<PathBuf>,
    /// Disable UDP peer discovery.
    #[arg(long)]
    pub no_discovery: bool,
    /// Disable chain synchronization.
    #[arg(long)]
    pub no_sync: bool,
    /// Comma-separated enode URLs, or `from_chain` for the preset list.
    #[arg(long, default_value = "from_chain")]
    pub bootnodes: String,
    /// Enable warp sync (not supported; accepted for compatibility).
    #[arg(long)]
    pub warp: bool,
    /// Enable remote debugging hooks.
    #[arg(long)]
    pub debug: bool,
    /// The devp2p port (TCP and UDP).
    #[arg(long, default_value_t = 30303)]
    pub port: u16,
    /// Verbosity level (0-3).
    #[arg(long, short, action = ArgAction::Count)]
    pub v: u8,
}

fn init_tracing_subscriber(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = EmberCli::parse();
    init_tracing_subscriber(cli.v);

    let config = match node::NodeConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {err:#}");
            return ExitCode::from(1);
        }
    };

    match node::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("fatal: {err:#}");
            ExitCode::from(2)
        }
    }
}
