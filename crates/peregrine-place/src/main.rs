//! Peregrine place binary
//!
//! Hosts one agent place: accepts transferred agents, restores and schedules
//! them, and serves the mailbox.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

mod courier;

use courier::CourierFactory;
use peregrine::net::{AddressBook, HostAddr, TcpTransport, Transport};
use peregrine::{serve, InMemoryRegistry, Place};

/// Mobile-agent execution platform: one place per process
#[derive(Parser, Debug)]
#[command(name = "peregrine-place", version, about)]
struct Args {
    /// Port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(5001..=65535))]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    info!("Starting place on port {}", args.port);

    // Install the linked agent catalog; this host self-supplies payloads for
    // the types it can originate
    let registry = InMemoryRegistry::new()
        .with_factory(Arc::new(CourierFactory))
        .with_payload(courier::CODE_IDENTITY, courier::code_stamp());

    let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new(AddressBook::new()));
    let host = HostAddr::new("localhost", args.port);
    let place = Arc::new(Place::new(host, Arc::new(registry), transport));

    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!("Place ready on port {}", args.port);

    if let Err(e) = serve(place, listener).await {
        error!("Place error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
