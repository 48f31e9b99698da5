//! Run a single ring node over UDP, printing its neighbours periodically.
//!
//! Start a ring: `cargo run --example node -- --port 6881`
//! Join it:      `cargo run --example node -- --bootstrap 127.0.0.1:6881`

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use chord::{Dht, Id, RingEvent};

use clap::Parser;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on, random if omitted
    #[arg(short, long, default_value_t = 0)]
    port: u16,
    /// Nodes to join the ring through
    #[arg(short, long)]
    bootstrap: Vec<SocketAddr>,
    /// Width of the identifier space
    #[arg(long, default_value_t = chord::DEFAULT_BITS)]
    bits: usize,
    /// Hex identifier for this node, derived from the address if omitted
    #[arg(long)]
    id: Option<String>,
    /// Seconds between two stabilization rounds
    #[arg(long, default_value_t = 5)]
    stabilize: u64,
    /// Log every message
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .with_thread_names(true)
        .init();

    let mut builder = Dht::builder();
    builder
        .port(cli.port)
        .bits(cli.bits)
        .bootstrap(&cli.bootstrap)
        .stabilize_interval(Duration::from_secs(cli.stabilize));

    if let Some(id) = cli.id {
        builder.id(id.parse::<Id>().expect("invalid id"));
    }

    let mut dht = builder.build().expect("Failed to create ring node");
    let events = dht.ring_events().expect("Ring node stopped early");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .expect("Error setting Ctrl-C handler");

    info!("Ring node is running! Press Ctrl+C to stop.");

    let mut elapsed = Duration::ZERO;
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
        elapsed += Duration::from_millis(100);

        for event in events.try_iter() {
            match event {
                RingEvent::Joined(node) => info!(id = %node.id, address = %node.address, "Node joined"),
                RingEvent::Updated(node) => info!(id = %node.id, "Neighbour changed"),
                RingEvent::Left(id) => info!(%id, "Node left"),
            }
        }

        if elapsed < Duration::from_secs(cli.stabilize) {
            continue;
        }
        elapsed = Duration::ZERO;

        match dht.info() {
            Ok(info) => {
                let statistics = info.statistics();

                info!(
                    id = %info.id(),
                    address = %info.local_addr(),
                    successor = %info.successor().id,
                    predecessor = ?info.predecessor().map(|node| node.id.to_string()),
                    locations = info.locations(),
                    joining = info.joining(),
                    stable = info.stable(),
                    lookups = statistics.lookup_ops,
                    average_hops = statistics.average_path_length(),
                    "Ring node status"
                );
            }
            Err(error) => {
                warn!(?error, "Node stopped");
                break;
            }
        }
    }

    dht.shutdown();
    info!("Ring node stopped.");
}
