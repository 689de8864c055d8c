//! qn-state-manager: shared quantum-state server
//!
//! `serve` runs the server until a client sends TERMINATE; `kill` sends
//! TERMINATE to a running server.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quantum_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

use qn_02_state_manager::{kill_server, ServerConfig, StateManagerServer};

const DEFAULT_TIMING_LOG: &str = "server.log";

/// Quantum-state manager for parallel simulation
#[derive(Parser, Debug)]
#[command(name = "qn-state-manager")]
#[command(about = "Shared quantum-state register served over TCP")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server and wait for clients
    Serve {
        /// Bind address
        ip: IpAddr,

        /// Bind port
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,

        /// Number of clients to accept before dispatching [default: 4]
        #[arg(short, long)]
        clients: Option<usize>,

        /// Idle tick in milliseconds [default: 1000]
        #[arg(long)]
        tick_ms: Option<u64>,

        /// File receiving the computation timing summary [default: server.log]
        #[arg(long)]
        timing_log: Option<PathBuf>,
    },

    /// Tell a running server to terminate
    Kill {
        /// Server address
        ip: IpAddr,

        /// Server port
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _telemetry = init_telemetry(TelemetryConfig::for_component("state-manager"))
        .context("failed to initialize telemetry")?;

    match args.command {
        Command::Serve {
            ip,
            port,
            clients,
            tick_ms,
            timing_log,
        } => {
            // Flags override QN_* environment settings.
            let mut config = ServerConfig::from_env().context("invalid QN_* environment")?;
            config.ip = ip;
            config.port = port;
            if let Some(clients) = clients {
                config = config.with_client_num(clients);
            }
            if let Some(tick_ms) = tick_ms {
                config = config.with_tick(Duration::from_millis(tick_ms));
            }
            let timing_log = timing_log
                .or(config.timing_log.take())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TIMING_LOG));
            let config = config.with_timing_log(timing_log);

            let server = StateManagerServer::bind(config)
                .await
                .with_context(|| format!("failed to bind {ip}:{port}"))?;
            let metrics = server.run().await.context("state manager session failed")?;
            info!(
                total_seconds = metrics.total().as_secs_f64(),
                "state manager stopped"
            );
        }
        Command::Kill { ip, port } => {
            tokio::task::spawn_blocking(move || kill_server((ip, port)))
                .await
                .context("kill task panicked")?
                .with_context(|| format!("failed to reach {ip}:{port}"))?;
        }
    }

    Ok(())
}
