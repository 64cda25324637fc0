//! uxnode - a peer-to-peer UTXO blockchain node.
//!
//! This is the main entry point for the uxnode binary.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use ux_network::{DnsResolver, NetworkOptions};
use ux_node::{config::NodeConfig, node::Node};
use ux_storage::Database;

/// uxnode blockchain node.
#[derive(Parser, Debug)]
#[command(name = "uxnode")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "uxnode.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// P2P bind address
    #[arg(long)]
    bind: Option<String>,

    /// Extra static seed addresses (host:port)
    #[arg(long)]
    seed: Vec<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting uxnode v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration and apply CLI overrides
    let mut config = NodeConfig::load(&args.config)?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(bind) = args.bind {
        config.network.bind_address = bind;
    }
    config.network.static_seeds.extend(args.seed);

    info!("Node name: {}", config.node_name);
    info!("Data directory: {:?}", config.data_dir);
    info!("P2P: {}", config.network.bind_address);

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(Database::open(config.data_dir.join("db"))?);

    let options = NetworkOptions {
        max_peers: config.network.max_peers,
        min_peers: config.network.min_peers,
        ..Default::default()
    };

    let node = Node::start(config, options, store, Arc::new(DnsResolver)).await?;
    node.bootstrap().await;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    node.shutdown();

    info!("uxnode stopped");
    Ok(())
}
