//! tierkv: interactive shell against a replica set.
//!
//! Parses flags, connects once, then reads commands from stdin until `exit`
//! or end of input.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tierkv_cli::args::Args;
use tierkv_cli::{Reply, Shell};
use tierkv_config::ClientConfig;
use tierkv_kv::{Coordinator, CoordinatorConfig, StaticPlacement};
use tierkv_net::TcpTransport;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tierkv_metrics::init_tracing("warn");
    let args = Args::parse();
    let config = args.client_config()?;
    let target = target_label(&config);

    let coordinator = Coordinator::new(
        coordinator_config(&config),
        StaticPlacement::new(config.replica_set()),
        Arc::new(TcpTransport::new(config.connect_timeout())),
    );
    if let Err(e) = coordinator.connect().await {
        tracing::debug!(error = %e, "connect failed");
        println!("error: unable to connect to {}", target);
        return Ok(());
    }
    println!("connected to {}", target);

    let shell = Shell::new(coordinator);
    run_repl(&shell).await?;

    if args.dump_metrics {
        eprint!("{}", tierkv_metrics::encode_metrics());
    }
    Ok(())
}

fn coordinator_config(config: &ClientConfig) -> CoordinatorConfig {
    CoordinatorConfig {
        node_id: config.node_id.clone(),
        read_tier: config.read_level,
        write_tier: config.write_level,
        read_timeout: config.read_timeout(),
        write_timeout: config.write_timeout(),
        stat_timeout: config.stat_timeout(),
        conflict_policy: config.conflict_policy,
    }
}

/// `host:port`, or the comma-separated replica list when one was given.
fn target_label(config: &ClientConfig) -> String {
    config
        .replica_set()
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

async fn run_repl<T: tierkv_kv::Transport>(shell: &Shell<T>) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line = String::new();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        line.clear();
        if stdin.read_line(&mut line).await? == 0 {
            break;
        }

        match shell.execute(&line).await {
            Reply::Output(text) if text.is_empty() => {}
            Reply::Output(text) => {
                stdout.write_all(text.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            Reply::Exit => break,
        }
    }
    Ok(())
}
