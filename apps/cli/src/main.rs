//! Command-line entry point: a demonstration binary exercising
//! `NetworkContext` directly, with no separate daemon process to talk to.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sha1::{Digest, Sha1};
use tracing::info;

use tunnelmesh_config::{default_config_path, Config};
use tunnelmesh_daemon::NetworkContext;

#[derive(Parser)]
#[command(name = "tunnelmesh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// UDP port to bind. 0 selects an ephemeral port.
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Overlay community name, hashed into the 20-byte community id
    /// carried on every frame.
    #[arg(long, default_value = "tunnelmesh")]
    community: String,

    /// Fall back to a direct TCP connection when no circuit can be built.
    #[arg(long)]
    allow_direct_fallback: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the bootstrap endpoint list and report the outcome.
    Bootstrap,

    /// Build one circuit and report its state.
    Connect {
        /// Number of relay hops (1-3).
        #[arg(short = 'n', long)]
        hops: Option<usize>,
    },

    /// Show how many circuits are currently established.
    Status,

    /// Bootstrap, then run the circuit manager, pool health monitor, and
    /// peer-refresh loop until interrupted.
    Run,
}

fn community_id(name: &str) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(name.as_bytes());
    hasher.finalize().into()
}

#[tokio::main]
async fn main() -> Result<()> {
    tunnelmesh_logging::init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load_or_default(&config_path);
    let community = community_id(&cli.community);

    let ctx = NetworkContext::start(config, cli.port, community, cli.allow_direct_fallback).await?;
    info!(local_addr = ?ctx.transport.local_addr(), "node started");

    match cli.command {
        Commands::Bootstrap => {
            let outcome = ctx.run_bootstrap().await;
            println!("bootstrap outcome: {outcome:?}");
            println!("status: {:?}", ctx.status().await);
        }
        Commands::Connect { hops } => {
            let hops = hops.unwrap_or(ctx.circmgr.config().default_hops);
            let circuit_id = ctx.circmgr.create_circuit(hops).await?;
            let state = ctx.circmgr.circuit_state(circuit_id).await;
            println!("circuit {circuit_id} -> {state:?}");
        }
        Commands::Status => {
            println!("status: {:?}", ctx.status().await);
            println!(
                "circuits established: {} ({:.0}% of {})",
                ctx.circmgr.circuit_count().await,
                ctx.established_fraction().await * 100.0,
                ctx.circmgr.circuit_count().await
            );
            for id in ctx.circmgr.circuit_ids().await {
                println!("  {id}: {:?}", ctx.circmgr.circuit_state(id).await);
            }
        }
        Commands::Run => {
            ctx.run_bootstrap().await;
            ctx.run().await;
        }
    }

    Ok(())
}
