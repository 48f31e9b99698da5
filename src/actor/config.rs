use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::common::{Id, DEFAULT_BITS};
use crate::core::join::{DEFAULT_BOOTSTRAP_RETRIES, DEFAULT_BOOTSTRAP_RETRY_DELAY};
use crate::core::lookup::{DEFAULT_MAX_LOOKUP_HOPS, DEFAULT_MAX_LOOKUP_RETRIES};
use crate::core::stabilization::DEFAULT_STABILIZE_INTERVAL;
use crate::transport::DEFAULT_PORT;

/// Default request timeout before retrying a call to a non-responding node.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);
/// Default number of consecutive timeouts before a peer is evicted.
pub const DEFAULT_MAX_RETRY: u8 = 5;
/// Default maximum number of cached locations, finger table nodes excluded.
pub const DEFAULT_LOCATION_CAPACITY: usize = 1024;
/// Default time an evicted peer is ignored when learned second hand.
pub const DEFAULT_DEAD_RETENTION: Duration = Duration::from_secs(5 * 60);
/// Default number of memoized find_successor results.
pub const DEFAULT_MEMO_CAPACITY: usize = 256;
/// Default lifetime of a memoized find_successor result.
pub const DEFAULT_MEMO_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
/// Ring node configurations
pub struct Config {
    /// This node's identifier.
    ///
    /// Defaults to None, where an identifier is derived from the bound
    /// socket address.
    pub id: Option<Id>,
    /// Width of the identifier space in bits, `1..=160`.
    ///
    /// Defaults to [DEFAULT_BITS]
    pub bits: usize,
    /// Explicit port to listen on.
    ///
    /// Defaults to [DEFAULT_PORT]
    pub port: u16,
    /// Explicit IP address to bind to.
    ///
    /// Defaults to [Ipv4Addr::UNSPECIFIED]
    pub bind_address: IpAddr,
    /// Nodes to join the ring through, tried in turn.
    ///
    /// Defaults to none, starting a new ring.
    pub bootstrap: Vec<SocketAddr>,
    /// Timeout of a single call attempt, before any latency was observed.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// Consecutive timeouts after which a peer is considered dead.
    ///
    /// Defaults to [DEFAULT_MAX_RETRY]
    pub max_retry: u8,
    /// Period of the stabilization protocol.
    ///
    /// Defaults to [DEFAULT_STABILIZE_INTERVAL]
    pub stabilize_interval: Duration,
    /// Defaults to [DEFAULT_MAX_LOOKUP_HOPS]
    pub max_lookup_hops: usize,
    /// Defaults to [DEFAULT_MAX_LOOKUP_RETRIES]
    pub max_lookup_retries: usize,
    /// Join attempts after the first one fails.
    ///
    /// Defaults to [DEFAULT_BOOTSTRAP_RETRIES]
    pub bootstrap_retries: usize,
    /// Defaults to [DEFAULT_BOOTSTRAP_RETRY_DELAY]
    pub bootstrap_retry_delay: Duration,
    /// Defaults to [DEFAULT_LOCATION_CAPACITY]
    pub location_capacity: usize,
    /// Defaults to [DEFAULT_DEAD_RETENTION]
    pub dead_retention: Duration,
    /// Memoized find_successor results, 0 disables the memo.
    ///
    /// Defaults to [DEFAULT_MEMO_CAPACITY]
    pub memo_capacity: usize,
    /// Defaults to [DEFAULT_MEMO_TTL]
    pub memo_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: None,
            bits: DEFAULT_BITS,
            port: DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bootstrap: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retry: DEFAULT_MAX_RETRY,
            stabilize_interval: DEFAULT_STABILIZE_INTERVAL,
            max_lookup_hops: DEFAULT_MAX_LOOKUP_HOPS,
            max_lookup_retries: DEFAULT_MAX_LOOKUP_RETRIES,
            bootstrap_retries: DEFAULT_BOOTSTRAP_RETRIES,
            bootstrap_retry_delay: DEFAULT_BOOTSTRAP_RETRY_DELAY,
            location_capacity: DEFAULT_LOCATION_CAPACITY,
            dead_retention: DEFAULT_DEAD_RETENTION,
            memo_capacity: DEFAULT_MEMO_CAPACITY,
            memo_ttl: DEFAULT_MEMO_TTL,
        }
    }
}
