//! Calls to remote nodes: connection reuse, timeouts and retries.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::common::{
    ConnectionState, Id, LocationCache, Message, MessageType, Node, RequestSpecific,
    RequestTypeSpecific, ResponseSpecific, VERSION,
};
use crate::core::lookup::LookupId;
use crate::core::statistics::ChordStatistics;
use crate::error::CallError;
use crate::transport::{Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What to do with the outcome of a call.
pub(crate) enum Continuation {
    /// A hop of this lookup.
    Lookup(LookupId),
    /// Learning the bootstrap node's identifier.
    JoinPing,
    /// Asking our successor for its predecessor.
    StabilizeSuccessor,
    PingPredecessor,
    /// Nobody waits for the outcome.
    FireAndForget,
}

#[derive(Debug, Clone, Copy)]
enum CallState {
    /// Waiting for the connection to the peer.
    Queued,
    Sent { sent_at: Instant, deadline: Instant },
}

#[derive(Debug)]
struct Call {
    to: Node,
    request_type: RequestTypeSpecific,
    continuation: Continuation,
    state: CallState,
}

impl Call {
    /// Responses must come from the address the request went to.
    fn does_match(&self, from: &SocketAddr) -> bool {
        let to = self.to.address;

        if to.port() != from.port() {
            return false;
        }

        to.ip().is_unspecified() || to.ip() == from.ip()
    }
}

#[derive(Debug)]
/// Completion of a call.
pub(crate) struct Outcome {
    pub to: Node,
    pub continuation: Continuation,
    pub result: Result<ResponseSpecific, CallError>,
}

#[derive(Debug)]
pub(crate) enum Incoming {
    Request {
        from: SocketAddr,
        transaction_id: u32,
        request: RequestSpecific,
    },
    /// A response or connection event, consumed internally.
    Handled,
}

#[derive(Debug)]
/// Correlates requests and responses over a [Transport].
pub(crate) struct Dispatcher {
    transport: Box<dyn Transport>,
    id: Id,
    next_tid: u32,
    calls: HashMap<u32, Call>,
    request_timeout: Duration,
    max_retry: u8,
    outcomes: Vec<Outcome>,
    unreachable: Vec<Id>,
}

impl Dispatcher {
    pub fn new(transport: Box<dyn Transport>, id: Id, request_timeout: Duration, max_retry: u8) -> Self {
        Dispatcher {
            transport,
            id,
            next_tid: 0,
            calls: HashMap::new(),
            request_timeout,
            max_retry: max_retry.max(1),
            outcomes: Vec::new(),
            unreachable: Vec::new(),
        }
    }

    // === Getters ===

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Number of calls queued or in flight.
    pub fn pending(&self) -> usize {
        self.calls.len()
    }

    // === Public Methods ===

    /// Call `to`, the outcome is reported by [Self::drain_outcomes] once.
    ///
    /// Calls to a peer that is not connected yet wait for a single
    /// connection attempt.
    pub fn call(
        &mut self,
        locations: &mut LocationCache,
        statistics: &mut ChordStatistics,
        now: Instant,
        to: Node,
        request_type: RequestTypeSpecific,
        continuation: Continuation,
    ) -> u32 {
        let tid = self.tid();

        if locations.is_tombstoned(&to.id) {
            trace!(context = "dispatcher", id = ?to.id, "Not calling an evicted peer");
            statistics.record_failed_call();

            self.outcomes.push(Outcome {
                to,
                continuation,
                result: Err(CallError::Unreachable),
            });
            return tid;
        }

        locations.upsert(to, to.id);

        let mut call = Call {
            to,
            request_type,
            continuation,
            state: CallState::Queued,
        };

        let Some(location) = locations.get_mut(&to.id) else {
            // Only our own identifier is never stored.
            self.outcomes.push(Outcome {
                to,
                continuation,
                result: Err(CallError::Unreachable),
            });
            return tid;
        };

        // The first address recorded for an identifier wins.
        call.to = *location.node();
        location.outstanding += 1;

        match location.connection {
            ConnectionState::Connected => {
                let deadline = now + location.timeout(self.request_timeout);
                self.calls.insert(tid, call);
                self.send(statistics, tid, now, deadline);
            }
            ConnectionState::Connecting { .. } => {
                location.queue.push_back(tid);
                self.calls.insert(tid, call);
            }
            ConnectionState::Disconnected => {
                let deadline = now + location.timeout(self.request_timeout);
                location.connection = ConnectionState::Connecting { deadline };
                location.queue.push_back(tid);
                self.calls.insert(tid, call);

                let address = location.address();
                trace!(context = "dispatcher", ?address, "Connecting");
                self.transport.connect(address);
            }
        }

        tid
    }

    /// Send a response or an error back to a requester.
    pub fn respond(&mut self, address: SocketAddr, transaction_id: u32, message_type: MessageType) {
        let message = Message {
            transaction_id,
            version: Some(VERSION),
            message_type,
        };

        if let Err(error) = self.transport.send(address, &message) {
            debug!(?error, ?address, "Error sending response message");
        }
    }

    /// Handle the next transport event, None when there is none.
    pub fn poll(
        &mut self,
        locations: &mut LocationCache,
        statistics: &mut ChordStatistics,
        now: Instant,
    ) -> Option<Incoming> {
        match self.transport.poll()? {
            TransportEvent::Connected { address, result } => {
                self.on_connected(locations, statistics, now, address, result.is_ok());
            }
            TransportEvent::Message { from, message } => match message.message_type {
                MessageType::Request(request) => {
                    return Some(Incoming::Request {
                        from,
                        transaction_id: message.transaction_id,
                        request,
                    });
                }
                MessageType::Response(response) => {
                    self.on_response(locations, now, from, message.transaction_id, Ok(response));
                }
                MessageType::Error(error) => {
                    self.on_response(
                        locations,
                        now,
                        from,
                        message.transaction_id,
                        Err(CallError::Remote(error)),
                    );
                }
            },
        }

        Some(Incoming::Handled)
    }

    /// Expire connection attempts and calls past their deadline.
    ///
    /// Every expiry is retried with a longer deadline until a peer times out
    /// `max_retry` times in a row, then all its calls fail.
    pub fn tick(&mut self, locations: &mut LocationCache, statistics: &mut ChordStatistics, now: Instant) {
        let connecting = locations
            .iter()
            .filter_map(|location| match location.connection() {
                ConnectionState::Connecting { deadline } if deadline <= now => Some(*location.id()),
                _ => None,
            })
            .collect::<Vec<_>>();

        for id in connecting {
            let Some(timeouts) = self.record_timeout(locations, statistics, &id) else {
                continue;
            };

            if timeouts >= self.max_retry {
                self.give_up(locations, statistics, &id);
                continue;
            }

            if let Some(location) = locations.get_mut(&id) {
                let deadline = now + location.timeout(self.request_timeout) * (u32::from(timeouts) + 1);
                location.connection = ConnectionState::Connecting { deadline };

                trace!(context = "dispatcher", address = ?location.address(), timeouts, "Retrying connection");
                self.transport.connect(location.address());
            }
        }

        let mut expired = self
            .calls
            .iter()
            .filter_map(|(tid, call)| match call.state {
                CallState::Sent { deadline, .. } if deadline <= now => Some(*tid),
                _ => None,
            })
            .collect::<Vec<_>>();
        expired.sort_unstable();

        for tid in expired {
            // An earlier expiry may have failed every call to this peer.
            let Some(to) = self.calls.get(&tid).map(|call| call.to.id) else {
                continue;
            };

            let Some(timeouts) = self.record_timeout(locations, statistics, &to) else {
                self.fail(locations, statistics, tid, CallError::Unreachable);
                continue;
            };

            if timeouts >= self.max_retry {
                self.give_up(locations, statistics, &to);
                continue;
            }

            let timeout = locations
                .get(&to)
                .map(|location| location.timeout(self.request_timeout))
                .unwrap_or(self.request_timeout);

            self.send(statistics, tid, now, now + timeout * (u32::from(timeouts) + 1));
        }
    }

    /// Outcomes of completed calls, in completion order.
    pub fn drain_outcomes(&mut self) -> Vec<Outcome> {
        std::mem::take(&mut self.outcomes)
    }

    /// Peers that exhausted their retries since the last call.
    pub fn drain_unreachable(&mut self) -> Vec<Id> {
        std::mem::take(&mut self.unreachable)
    }

    // === Private Methods ===

    fn on_connected(
        &mut self,
        locations: &mut LocationCache,
        statistics: &mut ChordStatistics,
        now: Instant,
        address: SocketAddr,
        connected: bool,
    ) {
        let Some(id) = locations.id_for_address(&address) else {
            trace!(context = "dispatcher", ?address, "Connected to an unknown address");
            return;
        };

        if !connected {
            debug!(context = "dispatcher", ?address, "Connection failed");
            self.give_up(locations, statistics, &id);
            return;
        }

        let Some(location) = locations.get_mut(&id) else {
            return;
        };

        if !matches!(location.connection, ConnectionState::Connecting { .. }) {
            return;
        }

        location.connection = ConnectionState::Connected;
        let deadline = now + location.timeout(self.request_timeout);
        let queued = location.queue.drain(..).collect::<Vec<_>>();

        for tid in queued {
            self.send(statistics, tid, now, deadline);
        }
    }

    fn on_response(
        &mut self,
        locations: &mut LocationCache,
        now: Instant,
        from: SocketAddr,
        transaction_id: u32,
        result: Result<ResponseSpecific, CallError>,
    ) {
        let sent_at = match self.calls.get(&transaction_id) {
            Some(call) if call.does_match(&from) => match call.state {
                CallState::Sent { sent_at, .. } => sent_at,
                CallState::Queued => return,
            },
            _ => {
                trace!(
                    context = "socket_validation",
                    message = "Unexpected response id or wrong address"
                );
                return;
            }
        };

        let Some(call) = self.calls.remove(&transaction_id) else {
            return;
        };

        if let Some(location) = locations.get_mut(&call.to.id) {
            location.outstanding = location.outstanding.saturating_sub(1);
            location.consecutive_timeouts = 0;
            location.set_alive(true);
            location.record_latency(now.saturating_duration_since(sent_at));
        }
        locations.touch(&call.to.id);

        self.outcomes.push(Outcome {
            to: call.to,
            continuation: call.continuation,
            result,
        });
    }

    /// Count a timeout against `id`, returns None if it is unknown.
    ///
    /// The peer stays alive until [Self::give_up].
    fn record_timeout(
        &mut self,
        locations: &mut LocationCache,
        statistics: &mut ChordStatistics,
        id: &Id,
    ) -> Option<u8> {
        let location = locations.get_mut(id)?;

        location.consecutive_timeouts = location.consecutive_timeouts.saturating_add(1);
        statistics.record_timeout();

        Some(location.consecutive_timeouts)
    }

    /// Fail every queued and sent call to `id`, exactly once each.
    fn give_up(&mut self, locations: &mut LocationCache, statistics: &mut ChordStatistics, id: &Id) {
        let mut tids = self
            .calls
            .iter()
            .filter(|(_, call)| call.to.id == *id)
            .map(|(tid, _)| *tid)
            .collect::<Vec<_>>();
        tids.sort_unstable();

        debug!(context = "dispatcher", ?id, calls = tids.len(), "Peer is unreachable");

        for tid in tids {
            self.fail(locations, statistics, tid, CallError::Unreachable);
        }

        if let Some(location) = locations.get_mut(id) {
            location.connection = ConnectionState::Disconnected;
            location.queue.clear();
            location.outstanding = 0;
            location.set_alive(false);
        }

        self.unreachable.push(*id);
    }

    fn fail(
        &mut self,
        locations: &mut LocationCache,
        statistics: &mut ChordStatistics,
        tid: u32,
        error: CallError,
    ) {
        let Some(call) = self.calls.remove(&tid) else {
            return;
        };

        if let Some(location) = locations.get_mut(&call.to.id) {
            location.outstanding = location.outstanding.saturating_sub(1);
            location.queue.retain(|queued| *queued != tid);
        }

        statistics.record_failed_call();

        self.outcomes.push(Outcome {
            to: call.to,
            continuation: call.continuation,
            result: Err(error),
        });
    }

    /// (Re)send a known call.
    fn send(&mut self, statistics: &mut ChordStatistics, tid: u32, now: Instant, deadline: Instant) {
        let Some(call) = self.calls.get_mut(&tid) else {
            return;
        };

        call.state = CallState::Sent {
            sent_at: now,
            deadline,
        };

        let message = Message {
            transaction_id: tid,
            version: Some(VERSION),
            message_type: MessageType::Request(RequestSpecific {
                requester_id: self.id,
                request_type: call.request_type.clone(),
            }),
        };
        let to = call.to;

        statistics.record_rpc(&to.id);

        if let Err(error) = self.transport.send(to.address, &message) {
            debug!(?error, address = ?to.address, "Error sending request message");
        }
    }

    /// Increments self.next_tid and returns the previous value.
    fn tid(&mut self) -> u32 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1);
        tid
    }
}
