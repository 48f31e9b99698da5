use std::time::Instant;

use tracing::{debug, trace};

use crate::common::{
    between, ClosestPredecessorResponseArguments, Node, NodeResponseArguments,
    PingResponseArguments, RequestTypeSpecific, ResponseSpecific,
};
use crate::core::join::JoinPhase;
use crate::core::lookup::{HopReply, Lookup, LookupId};
use crate::error::{CallError, JoinError};

use super::dispatcher::{Continuation, Outcome};
use super::{Actor, PendingLookup, Purpose};

impl Actor {
    /// Evict unreachable peers and route every finished call to whatever
    /// was waiting for it, until the dispatcher has nothing left.
    pub(super) fn process_outcomes(&mut self, now: Instant) {
        loop {
            let unreachable = self.dispatcher.drain_unreachable();
            let outcomes = self.dispatcher.drain_outcomes();

            if unreachable.is_empty() && outcomes.is_empty() {
                break;
            }

            for id in unreachable {
                self.ring.evict(&id, now);

                if let Some(memo) = self.memo.as_mut() {
                    memo.retain(|_, memo| memo.predecessor.id != id && memo.successor.id != id);
                }
            }

            for outcome in outcomes {
                self.on_outcome(outcome, now);
            }
        }
    }

    fn on_outcome(&mut self, outcome: Outcome, now: Instant) {
        let Outcome {
            to,
            continuation,
            result,
        } = outcome;

        match continuation {
            Continuation::Lookup(id) => self.on_lookup_hop(id, to, result, now),
            Continuation::JoinPing => self.on_join_ping(to, result, now),
            Continuation::StabilizeSuccessor => self.on_successor_predecessor(to, result, now),
            Continuation::PingPredecessor => match result {
                Ok(ResponseSpecific::Ping(_)) | Err(CallError::Unreachable) => {}
                Ok(_) | Err(_) => {
                    debug!(context = "stabilization", predecessor = ?to.id, "Predecessor misbehaved");
                    self.ring.mark_dead(&to.id);
                }
            },
            Continuation::FireAndForget => {
                if let Err(error) = result {
                    trace!(?error, to = ?to.id, "Call failed");
                }
            }
        }
    }

    fn on_lookup_hop(
        &mut self,
        id: LookupId,
        to: Node,
        result: Result<ResponseSpecific, CallError>,
        now: Instant,
    ) {
        let Some(mut pending) = self.lookups.remove(&id) else {
            return;
        };

        if pending.lookup.current().id != to.id {
            self.lookups.insert(id, pending);
            return;
        }

        let step = match self.hop_reply(&to, result) {
            Ok(HopReply { closest, successor }) => {
                self.ring.notice(closest, to.id);
                self.ring.notice(successor, to.id);

                let evicted = |node: &Node| self.ring.locations().is_tombstoned(&node.id);

                if evicted(&successor) {
                    trace!(context = "lookup", node = ?to.id, successor = ?successor.id, "Hop reported an evicted successor");
                    pending.lookup.restart()
                } else {
                    // An evicted finger is no progress.
                    let closest = if evicted(&closest) { to } else { closest };

                    if pending.purpose == Purpose::Search {
                        let target = *pending.lookup.target();
                        self.searches.observe(&target, to, successor);
                    }

                    pending.lookup.on_hop(HopReply { closest, successor }, now)
                }
            }
            Err(error) => {
                trace!(context = "lookup", node = ?to.id, ?error, "Hop failed");

                // Unreachable nodes are already evicted.
                if error != CallError::Unreachable {
                    self.ring.mark_dead(&to.id);
                }

                pending.lookup.restart()
            }
        };

        self.drive(id, pending, step, now);
    }

    /// A well formed hop reply from `to`, naming nodes inside our ring.
    fn hop_reply(
        &self,
        to: &Node,
        result: Result<ResponseSpecific, CallError>,
    ) -> Result<HopReply, CallError> {
        match result? {
            ResponseSpecific::ClosestPredecessor(ClosestPredecessorResponseArguments {
                responder_id,
                node,
                successor,
            }) if responder_id == to.id
                && self.ring.space().contains(&node.id)
                && self.ring.space().contains(&successor.id) =>
            {
                Ok(HopReply {
                    closest: node,
                    successor,
                })
            }
            response => {
                debug!(context = "lookup", node = ?to.id, ?response, "Unexpected hop reply");
                Err(CallError::UnexpectedResponse)
            }
        }
    }

    fn on_join_ping(&mut self, to: Node, result: Result<ResponseSpecific, CallError>, now: Instant) {
        let Some(join) = self.join.as_ref() else {
            return;
        };
        if !matches!(join.phase(), JoinPhase::Pinging { address } if address == to.address) {
            return;
        }

        let me = *self.ring.id();

        let responder_id = match result {
            Ok(ResponseSpecific::Ping(PingResponseArguments { responder_id })) => responder_id,
            Ok(_) | Err(_) => {
                self.fail_join(JoinError::BootstrapUnreachable(to.address), now);
                return;
            }
        };

        // The bootstrap node was called under a guessed identifier.
        if to.id != responder_id || to.id == me {
            self.ring.locations.remove(&to.id);
        }

        if responder_id == me {
            self.fail_join(JoinError::SelfBootstrap, now);
            return;
        }
        if !self.ring.space().contains(&responder_id) {
            self.fail_join(JoinError::BootstrapUnreachable(to.address), now);
            return;
        }

        let bootstrap = Node::new(responder_id, to.address);
        self.ring.notice(bootstrap, responder_id);

        let id = self.next_lookup_id();
        if let Some(join) = self.join.as_mut() {
            join.locating(id);
        }

        debug!(context = "join", bootstrap = ?bootstrap.id, "Locating our place in the ring");

        let mut lookup = Lookup::new(
            me,
            bootstrap,
            self.max_lookup_hops,
            self.max_lookup_retries,
            now,
        );
        let step = lookup.start_at(bootstrap);

        self.drive(
            id,
            PendingLookup {
                lookup,
                purpose: Purpose::Join,
            },
            step,
            now,
        );
    }

    /// Our successor told us its predecessor, adopt it if it sits between
    /// us, then notify whoever is our successor now.
    fn on_successor_predecessor(
        &mut self,
        to: Node,
        result: Result<ResponseSpecific, CallError>,
        now: Instant,
    ) {
        match result {
            Ok(ResponseSpecific::Node(NodeResponseArguments { node, .. })) => {
                if let Some(node) = node {
                    if between(self.ring.id(), &to.id, &node.id) {
                        self.ring.notice(node, to.id);
                    }
                }
            }
            Err(CallError::Unreachable) => {}
            Ok(_) | Err(_) => {
                debug!(context = "stabilization", successor = ?to.id, "Successor misbehaved");
                self.ring.mark_dead(&to.id);
            }
        }

        let successor = self.ring.successor();
        if successor.id != *self.ring.id() {
            self.call(
                successor,
                RequestTypeSpecific::Notify,
                Continuation::FireAndForget,
                now,
            );
        }
    }
}
