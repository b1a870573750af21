//! KNXnet/IP tunneling client CLI.
//!
//! Opens a tunnel to a gateway and relays cEMI frames between the tunnel
//! and the terminal for manual testing: inbound frames are printed to
//! stdout as hex, and hex lines read from stdin are parsed and sent.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ Tunnel::open()          -- CONNECT handshake, spawns the session
//!  └─ stdin reader task       -- hex line -> CemiFrame -> tunnel.send()
//!  └─ inbound print loop      -- tunnel.inbound() -> hex line on stdout
//!  └─ ctrl-c                  -- tunnel.close()
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use knxnet_tunnel::{CemiFrame, Tunnel, TunnelConfig};

/// Opens a KNXnet/IP tunnel to a gateway and relays cEMI frames to/from
/// stdout/stdin as hex, one frame per line.
#[derive(Parser, Debug)]
#[command(name = "knxnet-tunnel", version, about)]
struct Cli {
    /// Gateway address, e.g. 192.168.1.10:3671.
    #[arg(long)]
    gateway: SocketAddr,

    /// Delay between retransmissions while awaiting a response, in milliseconds.
    #[arg(long, default_value_t = 500)]
    resend_interval_ms: u64,

    /// Interval between CONNECTIONSTATE_REQUEST heartbeat probes, in seconds.
    #[arg(long, default_value_t = 10)]
    heartbeat_interval_secs: u64,

    /// Deadline for any single request/response exchange, in seconds.
    #[arg(long, default_value_t = 10)]
    response_timeout_secs: u64,
}

impl Cli {
    fn tunnel_config(&self) -> TunnelConfig {
        TunnelConfig {
            resend_interval: Duration::from_millis(self.resend_interval_ms),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            response_timeout: Duration::from_secs(self.response_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!(gateway = %cli.gateway, "opening KNXnet/IP tunnel");

    let tunnel = Tunnel::open(cli.gateway, cli.tunnel_config()).await?;
    info!("tunnel established, reading cEMI frames from stdin as hex, one per line");

    let mut inbound = tunnel.inbound();
    let print_task = tokio::spawn(async move {
        while let Some(frame) = inbound.next().await {
            println!("{}", hex::encode(frame.as_bytes()));
        }
    });

    let stdin_task = {
        let tunnel = &tunnel;
        async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("error reading stdin: {e}");
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let bytes = match hex::decode(line) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("ignoring malformed hex line: {e}");
                        continue;
                    }
                };
                if let Err(e) = tunnel.send(CemiFrame::new(bytes)).await {
                    error!("send failed: {e}");
                }
            }
        }
    };

    tokio::select! {
        _ = stdin_task => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    tunnel.close().await;
    print_task.abort();
    info!("tunnel closed");
    Ok(())
}
