//! Iterative find_predecessor walk, one hop at a time.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::common::{between, between_right_incl, Id, Node};
use crate::error::LookupError;

/// Default cap on the nodes a single lookup may visit.
pub const DEFAULT_MAX_LOOKUP_HOPS: usize = 32;
/// Default cap on restarts and detours of a single lookup.
pub const DEFAULT_MAX_LOOKUP_RETRIES: usize = 3;

pub type LookupId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
/// What a hop candidate knows about the target.
pub struct HopReply {
    /// Candidate's closest node preceding the target, or the candidate itself.
    pub closest: Node,
    /// Candidate's successor, or the candidate itself when it is alone.
    pub successor: Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A finished lookup: `target` is in `(predecessor, successor]`.
pub struct LookupResult {
    pub target: Id,
    pub predecessor: Node,
    pub successor: Node,
    /// Nodes visited after the origin, in order.
    pub path: Box<[Id]>,
    pub elapsed: Duration,
}

impl LookupResult {
    pub fn hops(&self) -> usize {
        self.path.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStep {
    /// Ask this node for its closest preceding node and successor.
    Ask(Node),
    Done(LookupResult),
    Failed(LookupError),
}

#[derive(Debug)]
/// State of one find_predecessor walk.
pub struct Lookup {
    target: Id,
    origin: Node,
    current: Node,
    path: Vec<Id>,
    retries: usize,
    max_hops: usize,
    max_retries: usize,
    started_at: Instant,
}

impl Lookup {
    /// A lookup starting at `origin`, usually the local node.
    pub fn new(target: Id, origin: Node, max_hops: usize, max_retries: usize, now: Instant) -> Self {
        Lookup {
            target,
            origin,
            current: origin,
            path: Vec::new(),
            retries: 0,
            max_hops,
            max_retries,
            started_at: now,
        }
    }

    // === Getters ===

    pub fn target(&self) -> &Id {
        &self.target
    }

    /// The node whose reply is awaited.
    pub fn current(&self) -> &Node {
        &self.current
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    // === Public Methods ===

    /// Continue the walk at `node` instead of the origin.
    pub fn start_at(&mut self, node: Node) -> LookupStep {
        self.advance(node)
    }

    /// Consume the reply of [Self::current] and decide the next step.
    pub fn on_hop(&mut self, reply: HopReply, now: Instant) -> LookupStep {
        let candidate = self.current;
        let HopReply { closest, successor } = reply;

        trace!(
            context = "lookup_hop",
            target = ?self.target,
            candidate = ?candidate.id,
            closest = ?closest.id,
            successor = ?successor.id,
        );

        if successor.id == candidate.id
            || between_right_incl(&candidate.id, &successor.id, &self.target)
        {
            return self.finish(candidate, successor, now);
        }

        if between(&candidate.id, &self.target, &closest.id) {
            return self.advance(closest);
        }

        self.retries += 1;
        if self.retries > self.max_retries {
            return LookupStep::Failed(LookupError::NoProgress {
                target: self.target,
            });
        }

        // Walk the successor pointer, slower but still progress.
        if between(&candidate.id, &self.target, &successor.id) {
            return self.advance(successor);
        }

        LookupStep::Failed(LookupError::NoProgress {
            target: self.target,
        })
    }

    /// The current candidate could not be reached, start over from the origin.
    pub fn restart(&mut self) -> LookupStep {
        self.retries += 1;
        if self.retries > self.max_retries {
            return LookupStep::Failed(LookupError::Unreachable {
                retries: self.retries - 1,
            });
        }

        self.current = self.origin;

        LookupStep::Ask(self.origin)
    }

    /// Complete with an interval learned elsewhere.
    pub fn finish(&mut self, predecessor: Node, successor: Node, now: Instant) -> LookupStep {
        LookupStep::Done(LookupResult {
            target: self.target,
            predecessor,
            successor,
            path: self.path.clone().into_boxed_slice(),
            elapsed: now.saturating_duration_since(self.started_at),
        })
    }

    fn advance(&mut self, next: Node) -> LookupStep {
        if self.path.len() >= self.max_hops {
            return LookupStep::Failed(LookupError::MaxHops(self.max_hops));
        }

        self.path.push(next.id);
        self.current = next;

        LookupStep::Ask(next)
    }
}
