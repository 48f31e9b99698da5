//! Dht node.

use std::{
    net::{IpAddr, SocketAddr},
    thread,
    time::Duration,
};

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::info;

use crate::{
    actor::{Actor, Config, Info},
    common::{Id, Node},
    core::{join::JoinResponse, search::LookupResponse},
    error::{JoinError, LookupError},
    transport::Transport,
    LookupResult, RingEvent,
};

/// Time the actor thread waits for a message before ticking.
const TICK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
/// Ring node, running its [Actor] on a dedicated thread.
pub struct Dht(pub(crate) Sender<ActorMessage>);

#[derive(Debug, Default, Clone)]
/// A builder for the [Dht] node.
pub struct DhtBuilder(Config);

impl DhtBuilder {
    /// Set this node's identifier, it must fit in the ring.
    pub fn id(&mut self, id: Id) -> &mut Self {
        self.0.id = Some(id);

        self
    }

    /// Set the width of the identifier space, `1..=160` bits.
    pub fn bits(&mut self, bits: usize) -> &mut Self {
        self.0.bits = bits;

        self
    }

    /// Set bootstrapping nodes.
    pub fn bootstrap<T: ToString>(&mut self, bootstrap: &[T]) -> &mut Self {
        self.0.bootstrap = bootstrap
            .iter()
            .filter_map(|address| address.to_string().parse::<SocketAddr>().ok())
            .collect();

        self
    }

    /// Add more bootstrap nodes to the list.
    pub fn extra_bootstrap<T: ToString>(&mut self, extra_bootstrap: &[T]) -> &mut Self {
        self.0.bootstrap.extend(
            extra_bootstrap
                .iter()
                .filter_map(|address| address.to_string().parse::<SocketAddr>().ok()),
        );

        self
    }

    /// Create a new ring instead of joining one.
    pub fn no_bootstrap(&mut self) -> &mut Self {
        self.0.bootstrap = Vec::new();

        self
    }

    /// Set an explicit port to listen on.
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.0.port = port;

        self
    }

    /// Set an explicit IP address to bind to.
    pub fn bind_address(&mut self, bind_address: IpAddr) -> &mut Self {
        self.0.bind_address = bind_address;

        self
    }

    /// Timeout of a call to a peer we have no latency samples for.
    ///
    /// Once a peer answered, its timeout adapts to its observed latency.
    ///
    /// Defaults to [crate::DEFAULT_REQUEST_TIMEOUT]
    pub fn request_timeout(&mut self, request_timeout: Duration) -> &mut Self {
        self.0.request_timeout = request_timeout;

        self
    }

    /// Consecutive timeouts before a peer is evicted.
    pub fn max_retry(&mut self, max_retry: u8) -> &mut Self {
        self.0.max_retry = max_retry;

        self
    }

    /// Period of successor stabilization and finger refreshes.
    pub fn stabilize_interval(&mut self, stabilize_interval: Duration) -> &mut Self {
        self.0.stabilize_interval = stabilize_interval;

        self
    }

    /// Bounds of a single lookup: visited nodes and restarts.
    pub fn lookup_limits(&mut self, max_hops: usize, max_retries: usize) -> &mut Self {
        self.0.max_lookup_hops = max_hops;
        self.0.max_lookup_retries = max_retries;

        self
    }

    /// Join attempts after the first one and the delay between them.
    pub fn bootstrap_retries(&mut self, retries: usize, delay: Duration) -> &mut Self {
        self.0.bootstrap_retries = retries;
        self.0.bootstrap_retry_delay = delay;

        self
    }

    pub fn location_capacity(&mut self, capacity: usize) -> &mut Self {
        self.0.location_capacity = capacity;

        self
    }

    /// Memoized find_successor results and their lifetime, 0 capacity disables it.
    pub fn memo(&mut self, capacity: usize, ttl: Duration) -> &mut Self {
        self.0.memo_capacity = capacity;
        self.0.memo_ttl = ttl;

        self
    }

    /// Create a Dht node listening on UDP.
    pub fn build(&self) -> Result<Dht, std::io::Error> {
        Dht::new(self.0.clone())
    }

    /// Create a Dht node on top of any [Transport].
    pub fn build_with_transport(
        &self,
        transport: Box<dyn Transport>,
    ) -> Result<Dht, std::io::Error> {
        Dht::with_transport(self.0.clone(), transport)
    }
}

impl Dht {
    /// Create a new Dht node.
    ///
    /// Could return an error if it failed to bind to the specified
    /// port or other io errors while binding the udp socket.
    pub fn new(config: Config) -> Result<Self, std::io::Error> {
        let (sender, receiver) = flume::unbounded();

        let actor = Actor::new(config).map_err(io_error)?;

        thread::Builder::new()
            .name("Chord Dht".to_string())
            .spawn(move || run(actor, receiver))?;

        Ok(Dht(sender))
    }

    /// Create a new Dht node on top of any [Transport].
    pub fn with_transport(
        config: Config,
        transport: Box<dyn Transport>,
    ) -> Result<Self, std::io::Error> {
        let (sender, receiver) = flume::unbounded();

        let actor = Actor::with_transport(config, transport).map_err(io_error)?;

        thread::Builder::new()
            .name("Chord Dht".to_string())
            .spawn(move || run(actor, receiver))?;

        Ok(Dht(sender))
    }

    /// Returns a builder to edit settings before creating a Dht node.
    pub fn builder() -> DhtBuilder {
        DhtBuilder::default()
    }

    /// Create a new Dht node starting a ring of its own.
    pub fn alone() -> Result<Self, std::io::Error> {
        Dht::builder().no_bootstrap().build()
    }

    // === Getters ===

    /// Information and statistics about this [Dht] node.
    pub fn info(&self) -> Result<Info, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.0
            .send(ActorMessage::Info(sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    // === Public Methods ===

    /// Shutdown the actor thread loop.
    pub fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv();
    }

    /// Find the node responsible for `target`: the first node whose id
    /// equals or follows it on the ring.
    pub fn find_successor(&self, target: Id) -> Result<LookupResult, DhtLookupError> {
        let (sender, receiver) = flume::bounded::<LookupResponse>(1);

        self.0
            .send(ActorMessage::FindSuccessor(target, sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv().map_err(|_| DhtWasShutdown)??)
    }

    /// Join a ring through any of the `bootstrap` addresses, returns our
    /// successor.
    pub fn join(&self, bootstrap: &[SocketAddr]) -> Result<Node, DhtJoinError> {
        let (sender, receiver) = flume::bounded::<JoinResponse>(1);

        self.0
            .send(ActorMessage::Join(bootstrap.to_vec(), sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv().map_err(|_| DhtWasShutdown)??)
    }

    /// Run a stabilization round now.
    pub fn stabilize(&self) -> Result<(), DhtWasShutdown> {
        self.0
            .send(ActorMessage::Stabilize)
            .map_err(|_| DhtWasShutdown)
    }

    /// Ring membership changes from now on, until the Dht shuts down.
    pub fn ring_events(&self) -> Result<Receiver<RingEvent>, DhtWasShutdown> {
        let (sender, receiver) = flume::unbounded::<RingEvent>();

        self.0
            .send(ActorMessage::Subscribe(sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver)
    }
}

fn io_error(error: crate::Error) -> std::io::Error {
    match error {
        crate::Error::IO(error) => error,
        error => std::io::Error::new(std::io::ErrorKind::InvalidInput, error),
    }
}

fn run(mut actor: Actor, receiver: Receiver<ActorMessage>) {
    info!(id = ?actor.id(), address = ?actor.local_addr(), "Chord Dht listening");

    loop {
        match receiver.recv_timeout(TICK_INTERVAL) {
            Ok(ActorMessage::Shutdown(sender)) => {
                actor.shutdown();
                drop(receiver);
                let _ = sender.send(());
                break;
            }
            Ok(ActorMessage::Info(sender)) => {
                let _ = sender.send(actor.info());
            }
            Ok(ActorMessage::FindSuccessor(target, sender)) => {
                actor.find_successor(target, sender);
            }
            Ok(ActorMessage::Join(bootstrap, sender)) => {
                actor.join(bootstrap, Some(sender));
            }
            Ok(ActorMessage::Stabilize) => {
                actor.stabilize();
            }
            Ok(ActorMessage::Subscribe(sender)) => {
                actor.subscribe(sender);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                actor.shutdown();
                break;
            }
        }

        actor.tick();
    }
}

#[derive(Debug)]
pub(crate) enum ActorMessage {
    Info(Sender<Info>),
    FindSuccessor(Id, Sender<LookupResponse>),
    Join(Vec<SocketAddr>, Sender<JoinResponse>),
    Stabilize,
    Subscribe(Sender<RingEvent>),
    Shutdown(Sender<()>),
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("The Dht was shutdown")]
/// The actor thread is gone, the [Dht] can no longer be used.
pub struct DhtWasShutdown;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors of [Dht::find_successor].
pub enum DhtLookupError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    DhtWasShutdown(#[from] DhtWasShutdown),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors of [Dht::join].
pub enum DhtJoinError {
    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    DhtWasShutdown(#[from] DhtWasShutdown),
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use crate::transport::MemoryNetwork;

    use super::*;

    fn address(port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    fn node(network: &MemoryNetwork, id: u64, bootstrap: &[SocketAddr]) -> Dht {
        Dht::builder()
            .bits(8)
            .id(Id::from(id))
            .bootstrap(bootstrap)
            .build_with_transport(Box::new(network.bind(address(id as u16 + 2000))))
            .unwrap()
    }

    #[test]
    fn shutdown() {
        let mut dht = Dht::builder()
            .bind_address(Ipv4Addr::LOCALHOST.into())
            .no_bootstrap()
            .build()
            .unwrap();

        dht.shutdown();

        assert_eq!(dht.info().unwrap_err(), DhtWasShutdown);
    }

    #[test]
    fn reject_id_outside_the_ring() {
        let network = MemoryNetwork::new();

        let result = Dht::builder()
            .bits(8)
            .id(Id::from(300))
            .build_with_transport(Box::new(network.bind(address(1))));

        assert!(result.is_err());
    }

    #[test]
    fn join_and_find_successor() {
        let network = MemoryNetwork::new();

        let a = node(&network, 10, &[]);
        let b = node(&network, 80, &[]);

        let successor = b.join(&[address(2010)]).unwrap();
        assert_eq!(successor.id, Id::from(10));

        // The notify reaches 10 after the join completes.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while a.info().unwrap().successor().id != Id::from(80) {
            assert!(std::time::Instant::now() < deadline, "10 never learned about 80");
            thread::sleep(Duration::from_millis(5));
        }

        let result = a.find_successor(Id::from(50)).unwrap();
        assert_eq!(result.successor.id, Id::from(80));

        let result = b.find_successor(Id::from(90)).unwrap();
        assert_eq!(result.successor.id, Id::from(10));

        let info = b.info().unwrap();
        assert_eq!(info.successor().id, Id::from(10));
        assert_eq!(info.predecessor().map(|node| node.id), Some(Id::from(10)));
        assert!(info.stable());
    }

    #[test]
    fn ring_events() {
        let network = MemoryNetwork::new();

        let a = node(&network, 10, &[]);
        let events = a.ring_events().unwrap();

        let b = node(&network, 80, &[]);
        b.join(&[address(2010)]).unwrap();

        let newcomer = Node::new(Id::from(80), address(2080));
        let mut expected = vec![RingEvent::Joined(newcomer), RingEvent::Updated(newcomer)];

        while !expected.is_empty() {
            let event = events
                .recv_timeout(Duration::from_secs(5))
                .expect("10 never reported 80");
            expected.retain(|expected| *expected != event);
        }
    }
}
