//! Small rings of actors over an in process network.

use std::net::{Ipv4Addr, SocketAddr};
use std::thread;
use std::time::{Duration, Instant};

use chord::actor::{Actor, Config};
use chord::transport::MemoryNetwork;
use chord::{Id, JoinError, LookupResponse, Node, RingEvent};

fn address(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

fn config(id: u64) -> Config {
    Config {
        id: Some(Id::from(id)),
        bits: 8,
        request_timeout: Duration::from_millis(20),
        max_retry: 2,
        stabilize_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

fn actor(network: &MemoryNetwork, id: u64) -> Actor {
    Actor::with_transport(config(id), Box::new(network.bind(address(id as u16 + 7000)))).unwrap()
}

fn settle(actors: &mut [Actor]) {
    for _ in 0..16 {
        for actor in actors.iter_mut() {
            actor.tick();
        }
    }
}

/// Tick every actor until `done` or five seconds passed.
fn tick_until(actors: &mut [Actor], mut done: impl FnMut(&mut [Actor]) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !done(actors) {
        assert!(Instant::now() < deadline, "timed out");

        for actor in actors.iter_mut() {
            actor.tick();
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Nodes joined one after the other through the first one.
fn ring(network: &MemoryNetwork, ids: &[u64]) -> Vec<Actor> {
    let mut actors = vec![actor(network, ids[0])];
    let bootstrap = actors[0].local_addr();

    for &id in &ids[1..] {
        actors.push(actor(network, id));

        let (sender, receiver) = flume::bounded(1);
        let last = actors.len() - 1;
        actors[last].join(vec![bootstrap], Some(sender));

        let mut joined = None;
        tick_until(&mut actors, |_| {
            joined = receiver.try_recv().ok();
            joined.is_some()
        });
        assert!(matches!(joined, Some(Ok(_))), "{id} failed to join");
    }

    settle(&mut actors);
    actors
}

fn three_node_ring(network: &MemoryNetwork) -> Vec<Actor> {
    ring(network, &[10, 80, 200])
}

fn find_successor(actors: &mut [Actor], origin: usize, target: u64) -> LookupResponse {
    let (sender, receiver) = flume::bounded(1);
    actors[origin].find_successor(Id::from(target), sender);

    let mut response = None;
    tick_until(actors, |_| {
        response = receiver.try_recv().ok();
        response.is_some()
    });

    response.expect("checked by tick_until")
}

fn successor(actor: &Actor) -> u64 {
    id_to_u64(&actor.successor().id)
}

fn predecessor(actor: &Actor) -> Option<u64> {
    actor.predecessor().map(|node| id_to_u64(&node.id))
}

fn id_to_u64(id: &Id) -> u64 {
    let bytes = id.as_bytes();
    u64::from_be_bytes(bytes[12..].try_into().unwrap())
}

#[test]
fn sequential_joins_build_a_ring() {
    let network = MemoryNetwork::new();
    let actors = three_node_ring(&network);

    assert_eq!(
        actors.iter().map(successor).collect::<Vec<_>>(),
        vec![80, 200, 10]
    );
    assert_eq!(
        actors.iter().map(predecessor).collect::<Vec<_>>(),
        vec![Some(200), Some(10), Some(80)]
    );
}

#[test]
fn find_successor_from_any_node() {
    let network = MemoryNetwork::new();
    let mut actors = three_node_ring(&network);

    for origin in 0..3 {
        for (target, expected) in [(90, 200), (80, 80), (81, 200), (5, 10), (201, 10), (255, 10)] {
            let result = find_successor(&mut actors, origin, target).unwrap();

            assert_eq!(id_to_u64(&result.successor.id), expected, "{target} from {origin}");
            assert_eq!(id_to_u64(&result.target), target);
        }
    }
}

#[test]
fn concurrent_searches_share_a_lookup() {
    let network = MemoryNetwork::new();
    let mut actors = three_node_ring(&network);

    let before = actors[0].statistics();

    let (sender, receiver) = flume::unbounded();
    assert!(actors[0].find_successor(Id::from(150), sender.clone()).is_some());
    assert!(actors[0].find_successor(Id::from(150), sender.clone()).is_some());

    tick_until(&mut actors, |_| receiver.len() == 2);

    let results: Vec<_> = receiver.drain().map(|result| result.unwrap()).collect();
    assert_eq!(results[0], results[1]);
    assert_eq!(id_to_u64(&results[0].successor.id), 200);

    let after = actors[0].statistics();
    assert_eq!(after.lookup_ops - before.lookup_ops, 1);

    // Answered from recent results.
    assert!(actors[0].find_successor(Id::from(150), sender).is_none());
    assert_eq!(id_to_u64(&receiver.try_recv().unwrap().unwrap().successor.id), 200);
    assert_eq!(actors[0].statistics().memo_hits - before.memo_hits, 1);
}

#[test]
fn stabilization_closes_the_gap() {
    let network = MemoryNetwork::new();

    let mut actors = vec![actor(&network, 10), actor(&network, 200)];
    let bootstrap = actors[0].local_addr();
    actors[1].join(vec![bootstrap], None);
    tick_until(&mut actors, |actors| !actors[1].joining());
    settle(&mut actors);

    // 80 only knows its successor, nobody knows 80.
    actors.push(actor(&network, 80));
    let node_200 = *actors[1].node();
    actors[2].notice(node_200);
    assert_eq!(successor(&actors[2]), 200);

    actors[2].stabilize();
    settle(&mut actors);

    assert_eq!(predecessor(&actors[1]), Some(80));
    assert_eq!(successor(&actors[0]), 200);

    actors[0].stabilize();
    settle(&mut actors);

    assert_eq!(successor(&actors[0]), 80);
    assert_eq!(predecessor(&actors[2]), Some(10));
}

#[test]
fn unreachable_node_fails_queued_calls_once() {
    let network = MemoryNetwork::new();

    let patient = Actor::with_transport(
        Config {
            max_retry: 5,
            ..config(10)
        },
        Box::new(network.bind(address(7010))),
    )
    .unwrap();
    let mut actors = vec![patient, actor(&network, 200)];
    let bootstrap = actors[0].local_addr();
    actors[1].join(vec![bootstrap], None);
    tick_until(&mut actors, |actors| !actors[1].joining());
    settle(&mut actors);

    // 50 claims an address nobody is bound to.
    let ghost = Node::new(Id::from(50), address(9));
    assert!(actors[0].notice(ghost));
    assert_eq!(successor(&actors[0]), 50);

    let before = actors[0].statistics();

    let (sender, receiver) = flume::unbounded();
    for target in [60, 70, 80, 90, 100, 110] {
        actors[0].find_successor(Id::from(target), sender.clone());
    }
    assert!(receiver.is_empty());

    tick_until(&mut actors, |_| receiver.len() == 6);

    for result in receiver.drain() {
        assert_eq!(id_to_u64(&result.unwrap().successor.id), 200);
    }

    let after = actors[0].statistics();
    assert_eq!(after.timeouts - before.timeouts, 5);
    assert_eq!(after.failed_calls - before.failed_calls, 6);
    assert_eq!(after.rpcs_sent, before.rpcs_sent);
    assert!(!actors[0].locations().contains(&ghost.id));
    assert_eq!(successor(&actors[0]), 200);
}

#[test]
fn join_gives_up_after_retries() {
    let network = MemoryNetwork::new();

    let mut actors = vec![Actor::with_transport(
        Config {
            bootstrap_retries: 1,
            bootstrap_retry_delay: Duration::from_millis(10),
            ..config(10)
        },
        Box::new(network.bind(address(7010))),
    )
    .unwrap()];

    let start = Instant::now();
    let (sender, receiver) = flume::bounded(1);
    actors[0].join(vec![address(9)], Some(sender));

    let mut joined = None;
    tick_until(&mut actors, |_| {
        joined = receiver.try_recv().ok();
        joined.is_some()
    });

    assert_eq!(joined, Some(Err(JoinError::BootstrapUnreachable(address(9)))));
    assert!(start.elapsed() >= Duration::from_millis(10));
    assert!(!actors[0].joining());
}

#[test]
fn newer_join_supersedes() {
    let network = MemoryNetwork::new();
    let mut actor = actor(&network, 10);

    let (first, first_receiver) = flume::bounded(1);
    actor.join(vec![address(9)], Some(first));
    actor.join(vec![address(9)], None);

    assert_eq!(first_receiver.try_recv().unwrap(), Err(JoinError::Superseded));
    assert!(actor.joining());
}

#[test]
fn joining_fills_the_finger_table() {
    let network = MemoryNetwork::new();
    let mut actors = ring(&network, &[10, 80, 130, 200]);

    actors.push(actor(&network, 20));
    let bootstrap = actors[0].local_addr();
    actors[4].join(vec![bootstrap], None);
    assert!(!actors[4].stable());

    tick_until(&mut actors, |actors| actors[4].stable());

    let heads = actors[4]
        .finger_table()
        .successor_wedges()
        .iter()
        .map(|wedge| wedge.head().map(id_to_u64))
        .collect::<Vec<_>>();

    assert_eq!(
        heads,
        vec![None, None, None, None, None, Some(80), Some(130), Some(200)]
    );
    assert_eq!(actors[4].info().stabilization_rounds(), 0);
    assert!(actors[4].info().stable());
}

#[test]
fn ring_events_follow_membership() {
    let network = MemoryNetwork::new();
    let mut actors = three_node_ring(&network);

    let (sender, events) = flume::unbounded();
    actors[0].subscribe(sender);

    actors.push(actor(&network, 40));
    let bootstrap = actors[0].local_addr();
    actors[3].join(vec![bootstrap], None);
    tick_until(&mut actors, |actors| actors[3].stable());
    settle(&mut actors);

    // 40 alerted 10, its new predecessor.
    let newcomer = *actors[3].node();
    assert_eq!(
        events.drain().collect::<Vec<_>>(),
        vec![RingEvent::Joined(newcomer), RingEvent::Updated(newcomer)]
    );

    let crashed = *actors.remove(1).node();
    network.disconnect(&crashed.address);

    // 10 routes through 80 and finds it gone.
    let (sender, _results) = flume::unbounded();
    actors[0].find_successor(Id::from(100), sender);

    let mut seen = Vec::new();
    tick_until(&mut actors, |_| {
        seen.extend(events.try_iter());
        seen.contains(&RingEvent::Left(crashed.id))
    });

    assert!(!actors[0].locations().contains(&crashed.id));
    assert_eq!(successor(&actors[0]), 40);
}
