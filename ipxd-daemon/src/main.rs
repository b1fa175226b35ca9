#![forbid(unsafe_code)]

//! ipxd daemon entry point: flag parsing, tracing setup, and wiring of
//! the virtual segment behind the UDP server.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use ipxd_core::IpxdConfig;
use ipxd_net::{FilterNetwork, Hub, Network};
use ipxd_transport::{Server, ServerConfig};

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "IPX-over-UDP virtual network hub", long_about = None)]
struct Args {
    /// UDP port to listen on (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds of client silence before eviction
    #[arg(long = "client-timeout-secs")]
    client_timeout_secs: Option<u64>,

    /// Seconds of egress silence before a keepalive ping
    #[arg(long = "keepalive-secs")]
    keepalive_secs: Option<u64>,

    /// Forward Windows NetBIOS traffic instead of filtering it out
    #[arg(long)]
    allow_netbios: bool,
}

/// Initialize tracing. `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(args: &Args) -> Result<IpxdConfig> {
    let mut cfg = match &args.config {
        Some(path) => IpxdConfig::from_file(path)?,
        None => IpxdConfig::default(),
    };
    if let Some(port) = args.port {
        cfg.listen_port = port;
    }
    if let Some(secs) = args.client_timeout_secs {
        cfg.client_timeout_secs = secs;
    }
    if let Some(secs) = args.keepalive_secs {
        cfg.keepalive_secs = secs;
    }
    if args.allow_netbios {
        cfg.allow_netbios = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn build_network(cfg: &IpxdConfig) -> Arc<dyn Network> {
    let hub: Arc<dyn Network> = Arc::new(Hub::new());
    if cfg.allow_netbios {
        hub
    } else {
        Arc::new(FilterNetwork::new(hub))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = load_config(&args)?;
    init_tracing(cfg.log_level.as_deref().unwrap_or("info"));

    let network = build_network(&cfg);
    let server = Arc::new(Server::bind(cfg.listen_port, network, ServerConfig::from(&cfg)).await?);

    let run = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    server.close();
    run.await??;
    Ok(())
}
