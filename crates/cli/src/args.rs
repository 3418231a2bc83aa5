//! Command-line flags for the `tierkv` shell.

use clap::Parser;
use std::path::PathBuf;
use tierkv_common::{ConsistencyTier, Endpoint};
use tierkv_config::{ClientConfig, ConfigError};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Interactive client for a tierkv replica set", long_about = None)]
pub struct Args {
    /// Address of the server node [default: 127.0.0.1]
    #[arg(long)]
    pub host: Option<String>,

    /// Port of the server node [default: 7000]
    #[arg(long)]
    pub port: Option<u16>,

    /// Read consistency level: ONE, QUORUM or ALL [default: QUORUM]
    #[arg(long = "rl")]
    pub read_level: Option<ConsistencyTier>,

    /// Write consistency level: ONE, QUORUM or ALL [default: QUORUM]
    #[arg(long = "wl")]
    pub write_level: Option<ConsistencyTier>,

    /// YAML config file; flags given on the command line win.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Replica endpoint (host:port). Repeat for each replica; defaults to
    /// the single host:port server.
    #[arg(long = "replica")]
    pub replicas: Vec<Endpoint>,

    /// Print Prometheus metrics to stderr on exit.
    #[arg(long)]
    pub dump_metrics: bool,
}

impl Args {
    /// Merge the optional config file with the flags.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => tierkv_config::load_from_file(path)?,
            None => ClientConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(level) = self.read_level {
            config.read_level = level;
        }
        if let Some(level) = self.write_level {
            config.write_level = level;
        }
        if !self.replicas.is_empty() {
            config.replicas = self.replicas.clone();
        }
        config.validate()?;
        Ok(config)
    }
}
