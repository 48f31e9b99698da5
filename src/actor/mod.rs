//! Actor implementation - I/O orchestration layer for the ring.

pub(crate) mod config;
mod dispatcher;
mod handle_request;
mod handle_response;
mod info;

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use flume::Sender;
use tracing::{debug, info, trace, warn};

use crate::common::{
    between_right_incl, AlertRequestArguments, BoundedCache, FindClosestPredecessorRequestArguments,
    FingerTable, Id, IdSpace, LocationCache, Node, RequestTypeSpecific,
};
use crate::core::join::{Join, JoinPhase, JoinResponse, JoinStep};
use crate::core::lookup::{Lookup, LookupId, LookupResult, LookupStep};
use crate::core::ring::{Ring, RingEvent};
use crate::core::search::{LookupResponse, SearchDeduplicator, SearchHandle, Waiter};
use crate::core::stabilization::{StabilizationDecisions, Stabilizer};
use crate::core::statistics::{ChordStatistics, Statistics};
use crate::error::{JoinError, LookupError};
use crate::transport::{Transport, UdpTransport};
use crate::{Error, Result};

use dispatcher::{Continuation, Dispatcher, Incoming};

pub use config::{
    Config, DEFAULT_DEAD_RETENTION, DEFAULT_LOCATION_CAPACITY, DEFAULT_MAX_RETRY,
    DEFAULT_MEMO_CAPACITY, DEFAULT_MEMO_TTL, DEFAULT_REQUEST_TIMEOUT,
};
pub use info::Info;

/// Transport events handled in a single [Actor::tick].
const MAX_EVENTS_PER_TICK: usize = 256;

#[derive(Debug, Clone)]
struct Memo {
    predecessor: Node,
    successor: Node,
    at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    /// Answering find_successor waiters.
    Search,
    /// Locating our own place in the ring.
    Join,
}

#[derive(Debug)]
struct PendingLookup {
    lookup: Lookup,
    purpose: Purpose,
}

#[derive(Debug)]
/// Internal Actor called in the Dht thread loop, useful to create your own actor setup.
pub struct Actor {
    ring: Ring,
    dispatcher: Dispatcher,

    /// Lookups waiting for a remote hop
    lookups: HashMap<LookupId, PendingLookup>,
    next_lookup_id: LookupId,
    searches: SearchDeduplicator,
    /// Recent find_successor results
    memo: Option<BoundedCache<Id, Memo>>,

    join: Option<Join>,
    /// Successor wedges still being filled after joining
    filling: HashSet<usize>,
    stabilizer: Stabilizer,
    statistics: ChordStatistics,
    listeners: Vec<Sender<RingEvent>>,

    // Options
    max_lookup_hops: usize,
    max_lookup_retries: usize,
    bootstrap_retries: usize,
    bootstrap_retry_delay: Duration,
    location_capacity: usize,
    dead_retention: Duration,
    memo_ttl: Duration,
}

impl Actor {
    /// Creates a new Actor listening on UDP.
    ///
    /// Does not wait for anything; call [Actor::tick] to join the ring and
    /// run stabilization.
    pub fn new(config: Config) -> Result<Self> {
        let transport =
            UdpTransport::bind(SocketAddr::new(config.bind_address, config.port))?;

        Self::with_transport(config, Box::new(transport))
    }

    /// Creates a new Actor on top of any [Transport].
    pub fn with_transport(config: Config, transport: Box<dyn Transport>) -> Result<Self> {
        let space = IdSpace::new(config.bits)?;
        let local_addr = transport.local_addr();

        let id = match config.id {
            Some(id) if space.contains(&id) => id,
            Some(id) => {
                return Err(Error::IdOutsideRing {
                    id,
                    bits: config.bits,
                })
            }
            None if local_addr.ip().is_unspecified() => space.random_id(),
            None => space.reduce(Id::from_address(&local_addr)),
        };

        let me = Node::new(id, local_addr);
        let now = Instant::now();

        let memo = NonZeroUsize::new(config.memo_capacity).map(|capacity| {
            BoundedCache::with_eviction_hook(capacity, |target: &Id, memo: &Memo| {
                trace!(context = "memo", ?target, successor = ?memo.successor.id, "Evicted");
            })
        });

        let mut actor = Actor {
            ring: Ring::new(me, space),
            dispatcher: Dispatcher::new(transport, id, config.request_timeout, config.max_retry),

            lookups: HashMap::new(),
            next_lookup_id: 0,
            searches: SearchDeduplicator::new(),
            memo,

            join: None,
            filling: HashSet::new(),
            stabilizer: Stabilizer::new(config.stabilize_interval, config.bits, now),
            statistics: ChordStatistics::new(),
            listeners: Vec::new(),

            max_lookup_hops: config.max_lookup_hops,
            max_lookup_retries: config.max_lookup_retries,
            bootstrap_retries: config.bootstrap_retries,
            bootstrap_retry_delay: config.bootstrap_retry_delay,
            location_capacity: config.location_capacity,
            dead_retention: config.dead_retention,
            memo_ttl: config.memo_ttl,
        };

        info!(?id, ?local_addr, bits = config.bits, "Ring node started");

        if !config.bootstrap.is_empty() {
            actor.join_at(config.bootstrap, None, now);
        }

        Ok(actor)
    }

    // === Getters ===

    /// Returns the node's Id
    pub fn id(&self) -> &Id {
        self.ring.id()
    }

    /// Returns this node's Id and address.
    pub fn node(&self) -> &Node {
        self.ring.me()
    }

    /// Returns the address the transport is listening to.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.dispatcher.local_addr()
    }

    pub fn space(&self) -> &IdSpace {
        self.ring.space()
    }

    /// Our successor, ourselves when we know no other node.
    pub fn successor(&self) -> Node {
        self.ring.successor()
    }

    pub fn predecessor(&self) -> Option<Node> {
        self.ring.predecessor()
    }

    pub fn finger_table(&self) -> &FingerTable {
        self.ring.fingers()
    }

    pub fn locations(&self) -> &LocationCache {
        self.ring.locations()
    }

    /// Returns true while a join is in progress.
    pub fn joining(&self) -> bool {
        self.join.is_some()
    }

    /// Returns true once joined and every finger was looked up at least once.
    pub fn stable(&self) -> bool {
        self.join.is_none() && self.filling.is_empty()
    }

    pub fn statistics(&self) -> Statistics {
        self.statistics.snapshot()
    }

    /// Returns a thread safe and lightweight summary of this node's
    /// information and statistics.
    pub fn info(&self) -> Info {
        Info::from(self)
    }

    // === Public Methods ===

    /// Fire timeouts, run due joins and stabilization, then handle
    /// incoming messages.
    ///
    /// Call periodically; delays degrade lookup latency and ring quality.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now())
    }

    /// Same as [Self::tick] with an explicit clock, for simulations.
    pub fn tick_at(&mut self, now: Instant) {
        self.dispatcher
            .tick(&mut self.ring.locations, &mut self.statistics, now);
        self.process_outcomes(now);

        if self.join.as_ref().is_some_and(|join| join.is_due(now)) {
            self.begin_join_attempt(now);
        }

        let decisions = self.stabilizer.periodic_decisions_at(now);
        self.stabilize_with(decisions, now);

        for _ in 0..MAX_EVENTS_PER_TICK {
            match self
                .dispatcher
                .poll(&mut self.ring.locations, &mut self.statistics, now)
            {
                None => break,
                Some(Incoming::Request {
                    from,
                    transaction_id,
                    request,
                }) => self.handle_request(from, transaction_id, request),
                Some(Incoming::Handled) => {}
            }

            self.process_outcomes(now);
        }

        self.publish_events();
    }

    /// Run a stabilization round now, instead of waiting for the next one.
    pub fn stabilize(&mut self) {
        let now = Instant::now();
        let decisions = self.stabilizer.round_at(now);

        self.stabilize_with(decisions, now);
        self.publish_events();
    }

    /// Find the node responsible for `target`, delivered to `sender` once.
    ///
    /// Concurrent searches for the same target share one lookup. Targets are
    /// reduced into the identifier space. Returns None when answered from
    /// recent results.
    pub fn find_successor(
        &mut self,
        target: Id,
        sender: Sender<LookupResponse>,
    ) -> Option<SearchHandle> {
        self.search(target, Waiter::Sender(sender), Instant::now())
    }

    /// Stop waiting for a search, the search itself keeps running.
    pub fn remove_search_waiter(&mut self, handle: &SearchHandle) -> bool {
        self.searches.remove_waiter(handle)
    }

    /// Join a ring through any of the `bootstrap` addresses.
    ///
    /// Supersedes a join in progress.
    pub fn join(&mut self, bootstrap: Vec<SocketAddr>, sender: Option<Sender<JoinResponse>>) {
        self.join_at(bootstrap, sender, Instant::now())
    }

    /// Learn about `node` out of band.
    pub fn notice(&mut self, node: Node) -> bool {
        let changed = self.ring.notice(node, node.id);
        self.publish_events();

        changed
    }

    /// Send every ring membership change to `sender` from now on.
    ///
    /// Dropped once `sender` disconnects.
    pub fn subscribe(&mut self, sender: Sender<RingEvent>) {
        self.listeners.push(sender);
    }

    /// Tell `to` that `node` might be its neighbour.
    pub fn alert(&mut self, to: Node, node: Node) {
        self.call(
            to,
            RequestTypeSpecific::Alert(AlertRequestArguments { node }),
            Continuation::FireAndForget,
            Instant::now(),
        );
    }

    /// Fail every pending search and join with an abandoned error.
    pub fn shutdown(&mut self) {
        for waiter in self.searches.drain() {
            self.deliver(waiter, Err(LookupError::Abandoned));
        }
        self.lookups.clear();
        self.filling.clear();
        self.listeners.clear();

        if let Some(join) = self.join.take() {
            join.respond(Err(JoinError::Lookup(LookupError::Abandoned)));
        }
    }

    // === Private Methods ===

    fn call(
        &mut self,
        to: Node,
        request_type: RequestTypeSpecific,
        continuation: Continuation,
        now: Instant,
    ) {
        self.dispatcher.call(
            &mut self.ring.locations,
            &mut self.statistics,
            now,
            to,
            request_type,
            continuation,
        );
    }

    fn next_lookup_id(&mut self) -> LookupId {
        let id = self.next_lookup_id;
        self.next_lookup_id = self.next_lookup_id.wrapping_add(1);
        id
    }

    fn search(&mut self, target: Id, waiter: Waiter, now: Instant) -> Option<SearchHandle> {
        let target = self.ring.space().reduce(target);

        if let Some(memo) = self.memoized(&target, now) {
            self.statistics.record_memo_hit();

            let result = LookupResult {
                target,
                predecessor: memo.predecessor,
                successor: memo.successor,
                path: Box::new([]),
                elapsed: Duration::ZERO,
            };
            self.deliver(waiter, Ok(result));

            return None;
        }

        let (handle, is_new) = self.searches.register(target, waiter);

        if is_new {
            let id = self.next_lookup_id();
            self.searches.attach(&target, id);

            let mut lookup = Lookup::new(
                target,
                *self.ring.me(),
                self.max_lookup_hops,
                self.max_lookup_retries,
                now,
            );
            let step = lookup.on_hop(self.ring.local_hop(&target), now);

            self.drive(
                id,
                PendingLookup {
                    lookup,
                    purpose: Purpose::Search,
                },
                step,
                now,
            );
        }

        Some(handle)
    }

    /// A fresh memo whose nodes are still believed alive.
    fn memoized(&mut self, target: &Id, now: Instant) -> Option<Memo> {
        let memo = self.memo.as_mut()?.get(target)?;

        let fresh = now.saturating_duration_since(memo.at) < self.memo_ttl;
        let alive = |node: &Node| {
            node.id == *self.ring.id() || self.ring.locations().is_alive(&node.id)
        };

        (fresh && alive(&memo.predecessor) && alive(&memo.successor)).then_some(memo)
    }

    /// Advance a lookup until it waits for a remote hop or finishes.
    fn drive(&mut self, id: LookupId, mut pending: PendingLookup, mut step: LookupStep, now: Instant) {
        loop {
            match step {
                LookupStep::Ask(node) if node.id == *self.ring.id() => {
                    let reply = self.ring.local_hop(pending.lookup.target());
                    step = pending.lookup.on_hop(reply, now);
                }
                LookupStep::Ask(node) => {
                    let target = *pending.lookup.target();

                    if pending.purpose == Purpose::Search {
                        if let Some((predecessor, successor)) = self.searches.test(&target) {
                            trace!(context = "lookup", ?target, "Answered by another search");
                            step = pending.lookup.finish(predecessor, successor, now);
                            continue;
                        }
                    }

                    self.call(
                        node,
                        RequestTypeSpecific::FindClosestPredecessor(
                            FindClosestPredecessorRequestArguments { target },
                        ),
                        Continuation::Lookup(id),
                        now,
                    );
                    self.lookups.insert(id, pending);

                    return;
                }
                LookupStep::Done(result) => {
                    self.complete_lookup(id, pending, Ok(result), now);
                    return;
                }
                LookupStep::Failed(error) => {
                    self.complete_lookup(id, pending, Err(error), now);
                    return;
                }
            }
        }
    }

    fn complete_lookup(
        &mut self,
        id: LookupId,
        pending: PendingLookup,
        result: LookupResponse,
        now: Instant,
    ) {
        let target = *pending.lookup.target();

        if pending.purpose == Purpose::Join {
            self.join_located(id, result, now);
            return;
        }

        match &result {
            Ok(found) => {
                debug!(
                    context = "lookup",
                    ?target,
                    successor = ?found.successor.id,
                    hops = found.hops(),
                    "Lookup done"
                );

                self.statistics.record_lookup(found);

                if let Some(memo) = self.memo.as_mut() {
                    memo.insert(
                        target,
                        Memo {
                            predecessor: found.predecessor,
                            successor: found.successor,
                            at: now,
                        },
                    );
                }
            }
            Err(error) => {
                debug!(context = "lookup", ?target, ?error, "Lookup failed");
                self.statistics.record_lookup_failure();
            }
        }

        for waiter in self.searches.complete(&target) {
            self.deliver(waiter, result.clone());
        }
    }

    fn deliver(&mut self, waiter: Waiter, result: LookupResponse) {
        match waiter {
            Waiter::Sender(sender) => {
                let _ = sender.send(result);
            }
            Waiter::FixFinger(index) => {
                match result {
                    Ok(found) => {
                        self.ring.fix_finger(index, found.successor);
                    }
                    Err(error) => {
                        debug!(context = "stabilization", index, ?error, "Could not refresh finger");
                    }
                }

                if self.filling.remove(&index) && self.filling.is_empty() {
                    info!(context = "join", "Finger table filled");
                }
            }
        }
    }

    fn publish_events(&mut self) {
        let events = self.ring.drain_events();
        if events.is_empty() {
            return;
        }

        self.listeners
            .retain(|listener| events.iter().all(|event| listener.send(*event).is_ok()));
    }

    // === Join ===

    fn join_at(
        &mut self,
        bootstrap: Vec<SocketAddr>,
        sender: Option<Sender<JoinResponse>>,
        now: Instant,
    ) {
        if let Some(previous) = self.join.take() {
            previous.respond(Err(JoinError::Superseded));
        }
        self.filling.clear();

        if bootstrap.is_empty() {
            if let Some(sender) = sender {
                let _ = sender.send(Err(JoinError::NoBootstrap));
            }
            return;
        }

        self.join = Join::new(
            bootstrap.into_boxed_slice(),
            self.bootstrap_retries,
            self.bootstrap_retry_delay,
            sender,
        );

        self.begin_join_attempt(now);
    }

    /// Ping the bootstrap node of the current attempt to learn its identifier.
    fn begin_join_attempt(&mut self, now: Instant) {
        let Some(join) = self.join.as_mut() else {
            return;
        };

        let address = join.begin_attempt();
        debug!(context = "join", ?address, attempt = join.attempt(), "Pinging bootstrap node");

        let known = self
            .ring
            .locations()
            .id_for_address(&address)
            .and_then(|id| self.ring.node(&id));

        let Some(bootstrap) = known.or_else(|| {
            self.provisional_id(&address)
                .map(|id| Node::new(id, address))
        }) else {
            self.fail_join(JoinError::BootstrapUnreachable(address), now);
            return;
        };

        self.call(bootstrap, RequestTypeSpecific::Ping, Continuation::JoinPing, now);
    }

    /// An unused identifier to call an unknown bootstrap node under, until
    /// it tells us its own.
    fn provisional_id(&self, address: &SocketAddr) -> Option<Id> {
        let space = self.ring.space();
        let mut id = space.reduce(Id::from_address(address));

        let known = self.ring.locations().len() + self.ring.locations().tombstone_count();

        for _ in 0..known + 2 {
            let locations = self.ring.locations();
            if id != *self.ring.id() && !locations.contains(&id) && !locations.is_tombstoned(&id) {
                return Some(id);
            }
            id = space.increment(&id);
        }

        None
    }

    fn join_located(&mut self, lookup_id: LookupId, result: LookupResponse, now: Instant) {
        let is_current = self.join.as_ref().is_some_and(|join| {
            matches!(join.phase(), JoinPhase::Locating { lookup } if lookup == lookup_id)
        });
        if !is_current {
            return;
        }

        let found = match result {
            Ok(found) => found,
            Err(error) => {
                self.fail_join(JoinError::Lookup(error), now);
                return;
            }
        };

        let Some(join) = self.join.take() else {
            return;
        };

        let me = *self.ring.me();
        let LookupResult {
            predecessor,
            successor,
            ..
        } = found;

        self.ring.notify(predecessor);
        self.ring.notice(successor, predecessor.id);

        if successor.id != me.id {
            self.call(successor, RequestTypeSpecific::Notify, Continuation::FireAndForget, now);
        }
        if predecessor.id != me.id {
            self.call(
                predecessor,
                RequestTypeSpecific::Alert(AlertRequestArguments { node: me }),
                Continuation::FireAndForget,
                now,
            );
        }

        self.statistics.record_insert(found.hops());

        info!(
            context = "join",
            id = ?me.id,
            predecessor = ?predecessor.id,
            successor = ?successor.id,
            "Joined the ring"
        );

        join.respond(Ok(successor));

        self.fill_fingers(now);
    }

    /// Look up every successor wedge now, instead of one per stabilization
    /// round.
    fn fill_fingers(&mut self, now: Instant) {
        let me = *self.ring.id();
        let successor = self.ring.successor();

        for index in 0..self.ring.space().bits() {
            let target = self.ring.space().successor_id(&me, index);

            // Our successor is the answer, no need to ask.
            if between_right_incl(&me, &successor.id, &target) {
                self.ring.fix_finger(index, successor);
                continue;
            }

            self.filling.insert(index);
            self.search(target, Waiter::FixFinger(index), now);
        }

        debug!(context = "join", pending = self.filling.len(), "Filling the finger table");
    }

    fn fail_join(&mut self, error: JoinError, now: Instant) {
        let Some(join) = self.join.as_mut() else {
            return;
        };

        match join.fail(now, error.clone()) {
            JoinStep::Retry { at } => {
                debug!(
                    context = "join",
                    ?error,
                    retry_in = ?at.saturating_duration_since(now),
                    "Join attempt failed"
                );
            }
            JoinStep::GiveUp(error) => {
                warn!(context = "join", ?error, "Could not join the ring");

                if let Some(join) = self.join.take() {
                    join.respond(Err(error));
                }
            }
        }
    }

    // === Stabilization ===

    fn stabilize_with(&mut self, decisions: StabilizationDecisions, now: Instant) {
        if decisions.should_stabilize {
            self.stabilize_successor(now);
        }

        if let Some(index) = decisions.finger_to_fix {
            let target = self.ring.space().successor_id(self.ring.id(), index);
            self.search(target, Waiter::FixFinger(index), now);
        }

        if decisions.should_check_predecessor {
            if let Some(predecessor) = self.ring.predecessor() {
                self.call(
                    predecessor,
                    RequestTypeSpecific::Ping,
                    Continuation::PingPredecessor,
                    now,
                );
            }
        }

        if decisions.should_housekeep {
            self.housekeeping(now);
        }
    }

    /// Ask our successor for its predecessor, the reply decides whom to notify.
    fn stabilize_successor(&mut self, now: Instant) {
        let successor = self.ring.successor();

        if successor.id == *self.ring.id() {
            // Alone as far as we know, anyone who notified us comes next.
            if let Some(predecessor) = self.ring.predecessor() {
                self.ring.notice(predecessor, predecessor.id);
            }
            return;
        }

        self.call(
            successor,
            RequestTypeSpecific::GetPredecessor,
            Continuation::StabilizeSuccessor,
            now,
        );
    }

    fn housekeeping(&mut self, now: Instant) {
        let removed = self
            .ring
            .housekeeping(now, self.dead_retention, self.location_capacity);

        let ttl = self.memo_ttl;
        if let Some(memo) = self.memo.as_mut() {
            memo.retain(|_, memo| now.saturating_duration_since(memo.at) < ttl);
        }

        if !removed.is_empty() {
            debug!(context = "housekeeping", removed = removed.len(), "Dropped locations");
        }
    }
}

#[cfg(test)]
mod test {
    use crate::common::{
        ClosestPredecessorResponseArguments, Message, MessageType, RequestSpecific,
        ResponseSpecific,
    };
    use crate::transport::{MemoryNetwork, MemoryTransport, Transport, TransportEvent};

    use super::*;

    fn address(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn actor(network: &MemoryNetwork, id: u64) -> Actor {
        let config = Config {
            id: Some(Id::from(id)),
            bits: 8,
            ..Default::default()
        };

        Actor::with_transport(config, Box::new(network.bind(address(id as u16 + 1000)))).unwrap()
    }

    /// Answer the next find_closest_predecessor request `peer` received.
    fn answer_hop(peer: &mut MemoryTransport, responder_id: Id, node: Node, successor: Node) {
        let Some(TransportEvent::Message { from, message }) = peer.poll() else {
            panic!("no request received");
        };
        assert!(matches!(
            message.message_type,
            MessageType::Request(RequestSpecific {
                request_type: RequestTypeSpecific::FindClosestPredecessor(_),
                ..
            })
        ));

        let response = Message {
            transaction_id: message.transaction_id,
            version: None,
            message_type: MessageType::Response(ResponseSpecific::ClosestPredecessor(
                ClosestPredecessorResponseArguments {
                    responder_id,
                    node,
                    successor,
                },
            )),
        };
        peer.send(from, &response).unwrap();
    }

    #[test]
    fn id_outside_the_ring() {
        let network = MemoryNetwork::new();
        let config = Config {
            id: Some(Id::from(256)),
            bits: 8,
            ..Default::default()
        };

        assert!(matches!(
            Actor::with_transport(config, Box::new(network.bind(address(1)))),
            Err(Error::IdOutsideRing { bits: 8, .. })
        ));
    }

    #[test]
    fn lone_node_owns_every_target() {
        let network = MemoryNetwork::new();
        let mut actor = actor(&network, 10);
        let (tx, rx) = flume::unbounded();

        for target in [0, 10, 11, 255, 1000] {
            assert!(actor.find_successor(Id::from(target), tx.clone()).is_some());

            let result = rx.try_recv().unwrap().unwrap();
            assert_eq!(result.successor, *actor.node());
            assert_eq!(result.predecessor, *actor.node());
        }

        // 1000 is reduced to 232.
        assert_eq!(actor.statistics().lookup_ops, 5);
    }

    #[test]
    fn memo_answers_repeated_searches() {
        let network = MemoryNetwork::new();
        let mut actor = actor(&network, 10);
        let (tx, rx) = flume::unbounded();

        actor.find_successor(Id::from(90), tx.clone());
        assert!(actor.find_successor(Id::from(90), tx).is_none());

        assert_eq!(rx.drain().count(), 2);

        let statistics = actor.statistics();
        assert_eq!(statistics.lookup_ops, 1);
        assert_eq!(statistics.memo_hits, 1);
    }

    #[test]
    fn empty_bootstrap_fails_the_join() {
        let network = MemoryNetwork::new();
        let mut actor = actor(&network, 10);
        let (tx, rx) = flume::bounded(1);

        actor.join(vec![], Some(tx));

        assert_eq!(rx.try_recv().unwrap(), Err(JoinError::NoBootstrap));
        assert!(!actor.joining());
    }

    #[test]
    fn shutdown_abandons_searches() {
        let network = MemoryNetwork::new();
        let mut actor = actor(&network, 10);
        let (tx, rx) = flume::unbounded();

        // 50 is a black hole, so the search waits on it.
        actor.notice(Node::new(Id::from(50), address(9)));
        actor.find_successor(Id::from(90), tx);
        assert!(rx.try_recv().is_err());

        actor.shutdown();

        assert_eq!(rx.try_recv().unwrap(), Err(LookupError::Abandoned));
    }

    #[test]
    fn hops_never_lead_to_evicted_nodes() {
        let network = MemoryNetwork::new();
        let mut actor = actor(&network, 10);
        let mut peer = network.bind(address(1100));
        let peer_node = Node::new(Id::from(100), address(1100));
        actor.notice(peer_node);

        let evicted = Node::new(Id::from(120), address(9));
        actor.notice(evicted);
        actor.ring.evict(&evicted.id, Instant::now());

        let (tx, _rx) = flume::unbounded();
        actor.find_successor(Id::from(150), tx);
        actor.tick();

        // 100 has not noticed that 120 is gone yet.
        answer_hop(
            &mut peer,
            peer_node.id,
            evicted,
            Node::new(Id::from(110), address(8)),
        );
        actor.tick();

        assert!(actor.locations().is_tombstoned(&evicted.id));
        assert!(!actor.locations().contains(&evicted.id));
        assert_eq!(actor.ring.closest_preceding(&Id::from(150)).id, Id::from(110));

        // Walked the successor pointer instead.
        let pending = actor.lookups.values().next().unwrap();
        assert_eq!(pending.lookup.current().id, Id::from(110));
    }

    #[test]
    fn hop_replies_outside_the_ring_are_rejected() {
        let network = MemoryNetwork::new();
        let mut actor = actor(&network, 10);
        let mut peer = network.bind(address(1100));
        let peer_node = Node::new(Id::from(100), address(1100));
        actor.notice(peer_node);

        let (tx, rx) = flume::unbounded();
        actor.find_successor(Id::from(150), tx);
        actor.tick();

        answer_hop(
            &mut peer,
            peer_node.id,
            Node::new(Id::from(300), address(8)),
            Node::new(Id::from(110), address(8)),
        );
        actor.tick();

        assert!(!actor.locations().is_alive(&peer_node.id));
        assert!(!actor.locations().contains(&Id::from(300)));

        // Restarted from us, with 100 out of the picture.
        let result = rx.try_recv().unwrap().unwrap();
        assert_eq!(result.successor, *actor.node());
    }
}
