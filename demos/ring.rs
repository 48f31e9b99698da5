//! Simulate a ring in process: sequential joins, stabilization, lookups,
//! then crash a few nodes and watch the ring repair itself.
//!
//! Run: `cargo run --example ring -- --nodes 64`

use std::{
    net::{Ipv4Addr, SocketAddr},
    thread,
    time::{Duration, Instant},
};

use chord::{
    actor::{Actor, Config},
    transport::MemoryNetwork,
    Id, LookupResponse,
};

use clap::Parser;
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Ring size
    #[arg(short, long, default_value_t = 64)]
    nodes: usize,
    /// Width of the identifier space
    #[arg(long, default_value_t = 24)]
    bits: usize,
    /// Random lookups to measure path lengths with
    #[arg(short, long, default_value_t = 500)]
    lookups: usize,
    /// Nodes to crash after the ring settled
    #[arg(short, long, default_value_t = 4)]
    crash: usize,
}

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::WARN).init();

    let cli = Cli::parse();
    let network = MemoryNetwork::new();

    let config = Config {
        bits: cli.bits,
        request_timeout: Duration::from_millis(50),
        max_retry: 2,
        // Rounds are forced below.
        stabilize_interval: Duration::from_secs(3600),
        ..Default::default()
    };

    let mut actors: Vec<Actor> = (0..cli.nodes)
        .map(|i| {
            let address = SocketAddr::from((Ipv4Addr::LOCALHOST, 10_000 + i as u16));
            Actor::with_transport(config.clone(), Box::new(network.bind(address)))
                .expect("Failed to create node")
        })
        .collect();

    let bootstrap = actors[0].local_addr();

    let start = Instant::now();
    for i in 1..actors.len() {
        let (sender, receiver) = flume::bounded(1);
        actors[i].join(vec![bootstrap], Some(sender));

        loop {
            tick_all(&mut actors);

            if let Ok(result) = receiver.try_recv() {
                if let Err(error) = result {
                    println!("node {} failed to join: {error}", actors[i].id());
                }
                break;
            }
        }
    }
    println!("{} sequential joins in {:?}", actors.len() - 1, start.elapsed());

    stabilize(&mut actors, cli.bits * 2);
    println!("Successor pointers correct: {}", ring_is_correct(&actors));

    measure(&mut actors, cli.lookups);

    let crashed: Vec<Id> = actors
        .drain(1..=cli.crash.min(actors.len().saturating_sub(1)))
        .map(|actor| {
            network.disconnect(&actor.local_addr());
            *actor.id()
        })
        .collect();
    println!("\nCrashed {} nodes", crashed.len());

    let start = Instant::now();
    while !ring_is_correct(&actors) {
        stabilize(&mut actors, 1);
        thread::sleep(Duration::from_millis(20));

        if start.elapsed() > Duration::from_secs(30) {
            println!("Ring did not repair in time");
            return;
        }
    }
    println!("Ring repaired in {:?}", start.elapsed());

    measure(&mut actors, cli.lookups);
}

fn tick_all(actors: &mut [Actor]) {
    for actor in actors.iter_mut() {
        actor.tick();
    }
}

fn stabilize(actors: &mut [Actor], rounds: usize) {
    for _ in 0..rounds {
        for actor in actors.iter_mut() {
            actor.stabilize();
        }
        for _ in 0..8 {
            tick_all(actors);
        }
    }
}

fn ring_is_correct(actors: &[Actor]) -> bool {
    let mut ids: Vec<Id> = actors.iter().map(|actor| *actor.id()).collect();
    ids.sort();

    actors.iter().all(|actor| {
        let position = ids.binary_search(actor.id()).unwrap_or(0);
        let expected = ids[(position + 1) % ids.len()];

        actor.successor().id == expected
    })
}

fn measure(actors: &mut [Actor], lookups: usize) {
    let mut ids: Vec<Id> = actors.iter().map(|actor| *actor.id()).collect();
    ids.sort();

    let space = *actors[0].space();
    let (sender, receiver) = flume::unbounded::<LookupResponse>();

    for i in 0..lookups {
        let target = space.random_id();
        let origin = i % actors.len();

        actors[origin].find_successor(target, sender.clone());
    }

    let mut done = 0;
    let mut wrong = 0;
    let mut failed = 0;
    let mut hops = 0;

    while done < lookups {
        tick_all(actors);

        for response in receiver.try_iter() {
            done += 1;

            match response {
                Ok(result) => {
                    let expected = ids
                        .iter()
                        .find(|id| **id >= result.target)
                        .unwrap_or(&ids[0]);

                    if result.successor.id != *expected {
                        wrong += 1;
                    }
                    hops += result.hops();
                }
                Err(_) => failed += 1,
            }
        }
    }

    println!(
        "{lookups} lookups over {} nodes: {:.2} hops on average, {wrong} wrong, {failed} failed",
        actors.len(),
        hops as f64 / (lookups - failed).max(1) as f64,
    );
}
