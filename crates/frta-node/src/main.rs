mod events;
mod resolve;
mod run;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use frta_protocol::{
    EngineConfig, InterfaceId, ProtocolRuntime, RuntimeChannels, RuntimeConfig, UdpTransport,
};

#[derive(Parser)]
#[command(name = "frta-node", about = "Trust-aware ad-hoc routing node")]
struct Cli {
    /// This node's address on the ad-hoc network.
    #[arg(long)]
    address: Ipv4Addr,

    /// Interface index the address is attached to.
    #[arg(long, default_value = "1")]
    interface: InterfaceId,

    /// Local socket for control traffic. Defaults to 0.0.0.0:<control port>.
    #[arg(long)]
    bind: Option<SocketAddrV4>,

    /// Broadcast address of the shared medium.
    #[arg(long, default_value = "255.255.255.255")]
    broadcast: Ipv4Addr,

    /// Engine configuration as JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a node until Ctrl+C, logging protocol events as JSON lines.
    Run {
        /// Seconds between routing table dumps on stderr (0 disables).
        #[arg(long, default_value = "30")]
        table_interval: u64,
    },

    /// Discover a route to one destination and print it as JSON.
    Resolve {
        /// Destination address.
        #[arg(long)]
        target: Ipv4Addr,
        /// How long to wait for each discovery, in ms.
        #[arg(long, default_value = "2000")]
        timeout_ms: u64,
        /// Discoveries to try before giving up.
        #[arg(long, default_value = "3")]
        attempts: u32,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            EngineConfig::from_json(&json)?
        }
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine_config = load_config(cli.config.as_ref())?;
    let bind = cli
        .bind
        .unwrap_or_else(|| SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, engine_config.control_port));

    let transport = UdpTransport::bind(bind, cli.broadcast)
        .await
        .with_context(|| format!("binding control socket {bind}"))?;
    let local = transport.local_addr()?;

    eprintln!("frta-node v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Address: {} (interface {}), socket {local}", cli.address, cli.interface);
    eprintln!();

    let channels = ProtocolRuntime::spawn(transport, engine_config, RuntimeConfig::default());
    attach(&channels, cli.interface, cli.address).await?;

    match cli.command {
        Command::Run { table_interval } => {
            events::emit(&events::EventStarted::new(cli.address, local, "run"));
            run::run(channels, table_interval).await?;
        }
        Command::Resolve {
            target,
            timeout_ms,
            attempts,
        } => {
            events::emit(&events::EventStarted::new(cli.address, local, "resolve"));
            resolve::run(
                channels,
                resolve::ResolveConfig {
                    target,
                    timeout: std::time::Duration::from_millis(timeout_ms),
                    attempts,
                },
            )
            .await?;
        }
    }

    Ok(())
}

async fn attach(
    channels: &RuntimeChannels,
    interface: InterfaceId,
    address: Ipv4Addr,
) -> anyhow::Result<()> {
    channels.handle.interface_up(interface).await?;
    channels.handle.add_address(interface, address).await?;
    Ok(())
}
