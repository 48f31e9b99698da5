//! Lookup, join and RPC counters.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;

use crate::common::Id;
use crate::core::lookup::LookupResult;

/// Maximum number of peers to tally the load of.
const MAX_TRACKED_PEERS: usize = 1000;

/// Statistics about this node's routing activity
#[derive(Debug)]
pub struct ChordStatistics {
    /// Completed lookups
    lookup_ops: u64,

    /// Sum of hops over completed lookups
    lookup_path_sum: u64,

    /// Lookups that failed
    lookup_failures: u64,

    latency_sum: Duration,
    latency_max: Duration,

    /// Successful joins
    insert_ops: u64,

    /// Sum of hops of the lookups run by successful joins
    insert_path_sum: u64,

    rpcs_sent: u64,
    timeouts: u64,
    failed_calls: u64,
    memo_hits: u64,

    /// Requests sent per peer
    peer_load: LruCache<Id, u64>,
}

impl ChordStatistics {
    pub fn new() -> Self {
        ChordStatistics {
            lookup_ops: 0,
            lookup_path_sum: 0,
            lookup_failures: 0,
            latency_sum: Duration::ZERO,
            latency_max: Duration::ZERO,
            insert_ops: 0,
            insert_path_sum: 0,
            rpcs_sent: 0,
            timeouts: 0,
            failed_calls: 0,
            memo_hits: 0,
            peer_load: LruCache::new(
                NonZeroUsize::new(MAX_TRACKED_PEERS).expect("MAX_TRACKED_PEERS is NonZeroUsize"),
            ),
        }
    }

    pub fn record_lookup(&mut self, result: &LookupResult) {
        self.lookup_ops += 1;
        self.lookup_path_sum += result.hops() as u64;
        self.latency_sum += result.elapsed;
        self.latency_max = self.latency_max.max(result.elapsed);
    }

    pub fn record_lookup_failure(&mut self) {
        self.lookup_failures += 1;
    }

    pub fn record_insert(&mut self, hops: usize) {
        self.insert_ops += 1;
        self.insert_path_sum += hops as u64;
    }

    pub fn record_rpc(&mut self, to: &Id) {
        self.rpcs_sent += 1;

        match self.peer_load.get_mut(to) {
            Some(load) => *load += 1,
            None => {
                self.peer_load.put(*to, 1);
            }
        }
    }

    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    pub fn record_failed_call(&mut self) {
        self.failed_calls += 1;
    }

    pub fn record_memo_hit(&mut self) {
        self.memo_hits += 1;
    }

    /// Thread safe copy of the current counters.
    pub fn snapshot(&self) -> Statistics {
        let mut peer_load = self
            .peer_load
            .iter()
            .map(|(id, load)| (*id, *load))
            .collect::<Vec<_>>();
        peer_load.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Statistics {
            lookup_ops: self.lookup_ops,
            lookup_path_sum: self.lookup_path_sum,
            lookup_failures: self.lookup_failures,
            latency_sum: self.latency_sum,
            latency_max: self.latency_max,
            insert_ops: self.insert_ops,
            insert_path_sum: self.insert_path_sum,
            rpcs_sent: self.rpcs_sent,
            timeouts: self.timeouts,
            failed_calls: self.failed_calls,
            memo_hits: self.memo_hits,
            peer_load: peer_load.into_boxed_slice(),
        }
    }
}

impl Default for ChordStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Snapshot of a node's counters since it started.
pub struct Statistics {
    pub lookup_ops: u64,
    pub lookup_path_sum: u64,
    pub lookup_failures: u64,
    pub latency_sum: Duration,
    pub latency_max: Duration,
    pub insert_ops: u64,
    pub insert_path_sum: u64,
    pub rpcs_sent: u64,
    pub timeouts: u64,
    pub failed_calls: u64,
    /// Lookups answered from the memo without any hop.
    pub memo_hits: u64,
    /// Requests sent per peer, busiest first.
    pub peer_load: Box<[(Id, u64)]>,
}

impl Statistics {
    /// Mean hops per completed lookup.
    pub fn average_path_length(&self) -> f64 {
        if self.lookup_ops == 0 {
            return 0.0;
        }

        self.lookup_path_sum as f64 / self.lookup_ops as f64
    }

    pub fn average_latency(&self) -> Duration {
        match u32::try_from(self.lookup_ops) {
            Ok(0) => Duration::ZERO,
            Ok(ops) => self.latency_sum / ops,
            Err(_) => Duration::from_secs_f64(self.latency_sum.as_secs_f64() / self.lookup_ops as f64),
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use crate::common::Node;

    use super::*;

    fn result(hops: usize, elapsed: Duration) -> LookupResult {
        let node = Node::new(Id::from(1), SocketAddr::from(([127, 0, 0, 1], 1)));

        LookupResult {
            target: Id::from(2),
            predecessor: node,
            successor: node,
            path: (0..hops as u64).map(Id::from).collect(),
            elapsed,
        }
    }

    #[test]
    fn empty() {
        let snapshot = ChordStatistics::new().snapshot();

        assert_eq!(snapshot, Statistics::default());
        assert_eq!(snapshot.average_path_length(), 0.0);
        assert_eq!(snapshot.average_latency(), Duration::ZERO);
    }

    #[test]
    fn lookups() {
        let mut statistics = ChordStatistics::new();
        statistics.record_lookup(&result(2, Duration::from_millis(10)));
        statistics.record_lookup(&result(4, Duration::from_millis(30)));
        statistics.record_lookup_failure();

        let snapshot = statistics.snapshot();
        assert_eq!(snapshot.lookup_ops, 2);
        assert_eq!(snapshot.lookup_failures, 1);
        assert_eq!(snapshot.average_path_length(), 3.0);
        assert_eq!(snapshot.average_latency(), Duration::from_millis(20));
        assert_eq!(snapshot.latency_max, Duration::from_millis(30));
    }

    #[test]
    fn peer_load_busiest_first() {
        let mut statistics = ChordStatistics::new();
        statistics.record_rpc(&Id::from(1));
        statistics.record_rpc(&Id::from(2));
        statistics.record_rpc(&Id::from(2));

        let snapshot = statistics.snapshot();
        assert_eq!(snapshot.rpcs_sent, 3);
        assert_eq!(&*snapshot.peer_load, &[(Id::from(2), 2), (Id::from(1), 1)]);
    }
}
