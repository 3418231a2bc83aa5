//! tierkv-replica: a single in-memory replica for local clusters and demos.
//!
//! Loads config, binds the listen address, and serves replica calls until
//! Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tierkv_net::ReplicaServer;

#[derive(Parser, Debug)]
#[command(author, version, about = "In-memory tierkv replica", long_about = None)]
struct Args {
    /// Address to listen on. Overrides the config file.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// YAML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tierkv_metrics::init_tracing("info");
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => tierkv_config::load_replica_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => tierkv_config::ReplicaConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let server = ReplicaServer::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    tracing::info!("replica listening on {}", server.local_addr()?);

    server.run_until_ctrl_c().await?;
    Ok(())
}
