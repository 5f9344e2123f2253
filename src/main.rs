mod ac;
mod addr;
mod error;
mod eth;
mod hdlc;
mod iface;
mod serial;
mod session;
mod sock;
mod tags;

use crate::ac::AccessConcentrator;
use crate::addr::AddrBuilder;
use crate::error::BridgeError;
use crate::serial::SerialService;
use crate::session::Service;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Bridges a PPPoE client on an Ethernet segment to a PPP peer reachable
/// over an asynchronous serial line.
#[derive(Parser)]
struct Cli {
    /// Serial device the modem is attached to (e.g. /dev/ttyUSB0).
    serial_device: PathBuf,

    /// Service name this AC offers to PPPoE clients.
    service_name: String,

    /// Ethernet interface to listen on (e.g. eth0).
    interface: String,

    /// Name advertised in the AC-Name tag of discovery replies.
    #[arg(long, default_value = "pppoe-serial-bridge")]
    ac_name: String,

    /// Optional chat(8) script run against the modem before forwarding
    /// begins.
    #[arg(long)]
    chatscript: Option<PathBuf>,

    /// Largest session payload forwarded onto the Ethernet segment;
    /// larger payloads are dropped.
    #[arg(long, default_value_t = 1500)]
    mtu: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let ac = match build(&cli) {
        Ok(ac) => ac,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();

    if let Err(e) = spawn_signal_handler(shutdown.clone()) {
        tracing::error!("failed to install signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    ac.run(shutdown).await;

    ExitCode::SUCCESS
}

fn build(cli: &Cli) -> Result<AccessConcentrator, BridgeError> {
    let ifindex =
        iface::index_of(&cli.interface).map_err(|_| BridgeError::NoSuchInterface(cli.interface.clone()))?;

    let local_mac = iface::hardware_address(&cli.interface)
        .map_err(|e| BridgeError::HardwareAddress(cli.interface.clone(), e))?;

    let addr = AddrBuilder::new(ifindex);

    let discovery_sock =
        sock::PacketSocket::new().map_err(|e| BridgeError::Socket("discovery", e))?;
    discovery_sock
        .bind(&addr.build(eth::ETHERTYPE_DISCOVERY, None))
        .map_err(|e| BridgeError::Bind("discovery", e))?;

    let session_sock = sock::PacketSocket::new().map_err(|e| BridgeError::Socket("session", e))?;
    session_sock
        .bind(&addr.build(eth::ETHERTYPE_SESSION, None))
        .map_err(|e| BridgeError::Bind("session", e))?;

    let service = SerialService::new(
        cli.service_name.clone(),
        cli.serial_device.clone(),
        cli.chatscript.clone(),
    );

    let services: Vec<Box<dyn Service>> = vec![Box::new(service)];

    AccessConcentrator::new(
        cli.ac_name.clone(),
        local_mac,
        services,
        cli.mtu.into(),
        discovery_sock,
        session_sock,
        addr,
    )
}

/// Spawns a task that cancels `shutdown` on the first SIGINT or SIGTERM,
/// mirroring `huginn-proxy`'s signal-handling shape.
fn spawn_signal_handler(shutdown: CancellationToken) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }

        shutdown.cancel();
    });

    Ok(())
}
