//! Known peers, their connection state and liveness.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::common::{between, between_left_incl, Id, Node};

/// Lower bound of the adaptive request timeout.
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// A connection attempt is in flight, and expires at `deadline`.
    Connecting { deadline: Instant },
    Connected,
}

#[derive(Debug)]
/// Everything we know about one peer.
pub struct Location {
    node: Node,
    /// The node that told us about this peer.
    source: Id,
    alive: bool,
    pub(crate) connection: ConnectionState,
    /// Transaction ids waiting for the connection attempt to finish.
    pub(crate) queue: VecDeque<u32>,
    pub(crate) outstanding: usize,
    pub(crate) consecutive_timeouts: u8,

    rtt_total: Duration,
    rtt_count: u32,
    rtt_max: Duration,
}

impl Location {
    pub fn new(node: Node, source: Id) -> Self {
        Location {
            node,
            source,
            alive: true,
            connection: ConnectionState::Disconnected,
            queue: VecDeque::new(),
            outstanding: 0,
            consecutive_timeouts: 0,
            rtt_total: Duration::ZERO,
            rtt_count: 0,
            rtt_max: Duration::ZERO,
        }
    }

    // === Getters ===

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn id(&self) -> &Id {
        &self.node.id
    }

    pub fn address(&self) -> SocketAddr {
        self.node.address
    }

    pub fn source(&self) -> &Id {
        &self.source
    }

    pub fn alive(&self) -> bool {
        self.alive
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn consecutive_timeouts(&self) -> u8 {
        self.consecutive_timeouts
    }

    /// Mean round trip time, if any response was ever received.
    pub fn average_latency(&self) -> Option<Duration> {
        if self.rtt_count == 0 {
            return None;
        }

        Some(self.rtt_total / self.rtt_count)
    }

    pub fn max_latency(&self) -> Duration {
        self.rtt_max
    }

    /// Request timeout derived from observed latency, `default` when nothing
    /// was observed yet.
    pub fn timeout(&self, default: Duration) -> Duration {
        let Some(average) = self.average_latency() else {
            return default;
        };

        (average * 3)
            .max(self.rtt_max * 3 / 2)
            .clamp(MIN_REQUEST_TIMEOUT, default.max(MIN_REQUEST_TIMEOUT))
    }

    /// True if nothing is queued, in flight or connecting.
    pub fn idle(&self) -> bool {
        self.outstanding == 0
            && self.queue.is_empty()
            && !matches!(self.connection, ConnectionState::Connecting { .. })
    }

    // === Public Methods ===

    pub fn record_latency(&mut self, rtt: Duration) {
        self.rtt_total += rtt;
        self.rtt_count = self.rtt_count.saturating_add(1);
        self.rtt_max = self.rtt_max.max(rtt);
    }

    pub(crate) fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }
}

#[derive(Debug)]
/// Peers keyed by identifier, at most one [Location] per identifier.
///
/// Iteration order is recency of use, most recent first.
pub struct LocationCache {
    locations: LruCache<Id, Location>,
    addresses: HashMap<SocketAddr, Id>,
    /// Recently evicted peers, ignored when learned second hand.
    tombstones: HashMap<Id, Instant>,
}

impl LocationCache {
    pub fn new() -> Self {
        LocationCache {
            locations: LruCache::unbounded(),
            addresses: HashMap::new(),
            tombstones: HashMap::new(),
        }
    }

    // === Getters ===

    /// Lookup without touching the recency order.
    pub fn get(&self, id: &Id) -> Option<&Location> {
        self.locations.peek(id)
    }

    pub(crate) fn get_mut(&mut self, id: &Id) -> Option<&mut Location> {
        self.locations.peek_mut(id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.locations.contains(id)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn id_for_address(&self, address: &SocketAddr) -> Option<Id> {
        self.addresses.get(address).copied()
    }

    pub fn is_alive(&self, id: &Id) -> bool {
        self.get(id).map(|location| location.alive()).unwrap_or(false)
    }

    pub fn is_tombstoned(&self, id: &Id) -> bool {
        self.tombstones.contains_key(id)
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Locations, most recently used first.
    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter().map(|(_, location)| location)
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.iter().map(|location| *location.node()).collect()
    }

    // === Public Methods ===

    /// Create a Location for `node` unless one exists already. The first
    /// address recorded for an identifier wins.
    ///
    /// Returns true if a new Location was created.
    pub fn upsert(&mut self, node: Node, source: Id) -> bool {
        if self.locations.contains(&node.id) {
            return false;
        }

        self.tombstones.remove(&node.id);
        self.addresses.entry(node.address).or_insert(node.id);
        self.locations.put(node.id, Location::new(node, source));

        true
    }

    /// Move `id` to the most recently used position.
    pub fn touch(&mut self, id: &Id) {
        self.locations.promote(id);
    }

    pub fn remove(&mut self, id: &Id) -> Option<Location> {
        let location = self.locations.pop(id)?;

        if self.addresses.get(&location.address()) == Some(id) {
            self.addresses.remove(&location.address());
        }

        Some(location)
    }

    /// Remove `id` and remember it as dead until [Self::purge_dead] forgets it.
    pub fn evict(&mut self, id: &Id, now: Instant) -> Option<Location> {
        self.tombstones.insert(*id, now);
        self.remove(id)
    }

    pub fn mark_dead(&mut self, id: &Id) {
        if let Some(location) = self.locations.peek_mut(id) {
            location.set_alive(false);
        }
    }

    pub fn mark_alive(&mut self, id: &Id) {
        if let Some(location) = self.locations.peek_mut(id) {
            location.set_alive(true);
        }
    }

    pub fn record_latency(&mut self, id: &Id, rtt: Duration) {
        if let Some(location) = self.locations.peek_mut(id) {
            location.record_latency(rtt);
        }
    }

    /// The alive Location closest to `target` while strictly inside `(me, target)`.
    pub fn closest_preceding(&self, me: &Id, target: &Id) -> Option<Id> {
        self.iter()
            .filter(|location| location.alive() && between(me, target, location.id()))
            .map(|location| *location.id())
            .min_by_key(|id| target.wrapping_sub(id))
    }

    /// The alive Location in `[start, end)` closest to `start`.
    pub fn first_in(&self, start: &Id, end: &Id) -> Option<Id> {
        self.iter()
            .filter(|location| location.alive() && between_left_incl(start, end, location.id()))
            .map(|location| *location.id())
            .min_by_key(|id| id.wrapping_sub(start))
    }

    /// The alive Location in `[start, end)` closest to `end`.
    pub fn last_in(&self, start: &Id, end: &Id) -> Option<Id> {
        self.iter()
            .filter(|location| location.alive() && between_left_incl(start, end, location.id()))
            .map(|location| *location.id())
            .min_by_key(|id| end.wrapping_sub(id))
    }

    /// Forget tombstones older than `retention`, and drop Locations that were
    /// suspected dead while idle.
    pub fn purge_dead(&mut self, now: Instant, retention: Duration) -> Vec<Id> {
        self.tombstones
            .retain(|_, evicted_at| now.saturating_duration_since(*evicted_at) < retention);

        let dead = self
            .iter()
            .filter(|location| !location.alive() && location.idle())
            .map(|location| *location.id())
            .collect::<Vec<_>>();

        for id in &dead {
            self.evict(id, now);
        }

        dead
    }

    /// Drop least recently used idle Locations until at most `capacity` remain.
    /// Identifiers in `pinned` are never dropped.
    pub fn enforce_capacity(&mut self, capacity: usize, pinned: &HashSet<Id>) -> Vec<Id> {
        let excess = self.len().saturating_sub(capacity);
        if excess == 0 {
            return Vec::new();
        }

        let victims = self
            .locations
            .iter()
            .rev()
            .filter(|(id, location)| !pinned.contains(*id) && location.idle())
            .map(|(id, _)| *id)
            .take(excess)
            .collect::<Vec<_>>();

        for id in &victims {
            self.remove(id);
        }

        victims
    }
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn node(id: u64) -> Node {
        Node::new(
            Id::from(id),
            SocketAddr::from(([127, 0, 0, 1], 1000 + id as u16)),
        )
    }

    #[test]
    fn upsert_first_writer_wins() {
        let mut cache = LocationCache::new();
        let original = node(5);
        let moved = Node::new(original.id, SocketAddr::from(([10, 0, 0, 1], 9)));

        assert!(cache.upsert(original, Id::from(1)));
        assert!(!cache.upsert(moved, Id::from(2)));

        let location = cache.get(&original.id).unwrap();
        assert_eq!(location.address(), original.address);
        assert_eq!(location.source(), &Id::from(1));
        assert_eq!(cache.id_for_address(&original.address), Some(original.id));
    }

    #[test]
    fn get_does_not_touch() {
        let mut cache = LocationCache::new();
        cache.upsert(node(1), Id::ZERO);
        cache.upsert(node(2), Id::ZERO);

        cache.get(&Id::from(1));
        assert_eq!(cache.iter().next().unwrap().id(), &Id::from(2));

        cache.touch(&Id::from(1));
        assert_eq!(cache.iter().next().unwrap().id(), &Id::from(1));
    }

    #[test]
    fn adaptive_timeout() {
        let default = Duration::from_secs(2);
        let mut location = Location::new(node(1), Id::ZERO);

        assert_eq!(location.timeout(default), default);

        location.record_latency(Duration::from_millis(100));
        location.record_latency(Duration::from_millis(200));
        assert_eq!(location.average_latency(), Some(Duration::from_millis(150)));
        assert_eq!(location.timeout(default), Duration::from_millis(450));

        location.record_latency(Duration::from_millis(1));
        location.record_latency(Duration::from_millis(1));
        location.record_latency(Duration::from_millis(1));
        // Max dominates a small mean.
        assert_eq!(location.timeout(default), Duration::from_millis(300));

        let mut fast = Location::new(node(2), Id::ZERO);
        fast.record_latency(Duration::from_millis(1));
        assert_eq!(fast.timeout(default), MIN_REQUEST_TIMEOUT);

        let mut slow = Location::new(node(3), Id::ZERO);
        slow.record_latency(Duration::from_secs(5));
        assert_eq!(slow.timeout(default), default);
    }

    #[test]
    fn closest_preceding_skips_dead() {
        let mut cache = LocationCache::new();
        for id in [20, 50, 70, 90] {
            cache.upsert(node(id), Id::ZERO);
        }
        cache.mark_dead(&Id::from(70));

        let me = Id::from(10);
        assert_eq!(cache.closest_preceding(&me, &Id::from(80)), Some(Id::from(50)));
        assert_eq!(cache.closest_preceding(&me, &Id::from(20)), None);
        assert_eq!(cache.closest_preceding(&me, &Id::from(5)), Some(Id::from(90)));
    }

    #[test]
    fn wedge_candidates() {
        let mut cache = LocationCache::new();
        for id in [20, 50, 70] {
            cache.upsert(node(id), Id::ZERO);
        }

        assert_eq!(cache.first_in(&Id::from(30), &Id::from(80)), Some(Id::from(50)));
        assert_eq!(cache.last_in(&Id::from(30), &Id::from(80)), Some(Id::from(70)));
        assert_eq!(cache.first_in(&Id::from(71), &Id::from(10)), None);
    }

    #[test]
    fn eviction_leaves_a_tombstone() {
        let start = Instant::now();
        let mut cache = LocationCache::new();
        cache.upsert(node(1), Id::ZERO);

        assert!(cache.evict(&Id::from(1), start).is_some());
        assert!(!cache.contains(&Id::from(1)));
        assert!(cache.is_tombstoned(&Id::from(1)));
        assert_eq!(cache.id_for_address(&node(1).address), None);

        cache.purge_dead(start + Duration::from_secs(10), Duration::from_secs(5));
        assert!(!cache.is_tombstoned(&Id::from(1)));
    }

    #[test]
    fn capacity_spares_pinned_and_busy() {
        let mut cache = LocationCache::new();
        for id in 1..=5 {
            cache.upsert(node(id), Id::ZERO);
        }
        cache.get_mut(&Id::from(2)).unwrap().outstanding = 1;

        let pinned = HashSet::from([Id::from(1)]);
        let removed = cache.enforce_capacity(2, &pinned);

        assert_eq!(removed, vec![Id::from(3), Id::from(4), Id::from(5)]);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&Id::from(1)));
        assert!(cache.contains(&Id::from(2)));
    }
}
