use std::net::SocketAddr;

use crate::common::{Id, Node};
use crate::core::statistics::Statistics;

use super::Actor;

/// Information and statistics about this ring node.
#[derive(Debug, Clone)]
pub struct Info {
    id: Id,
    local_addr: SocketAddr,
    bits: usize,
    successor: Node,
    predecessor: Option<Node>,
    locations: usize,
    joining: bool,
    stable: bool,
    searches: usize,
    stabilization_rounds: u64,
    statistics: Statistics,
}

impl Info {
    /// This Node's [Id]
    pub fn id(&self) -> &Id {
        &self.id
    }
    /// Local socket address that this node is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
    /// Width of the identifier space.
    pub fn bits(&self) -> usize {
        self.bits
    }
    /// Returns this node itself when it knows no other node.
    pub fn successor(&self) -> Node {
        self.successor
    }
    pub fn predecessor(&self) -> Option<Node> {
        self.predecessor
    }
    /// Number of nodes in the location cache, dead ones included.
    pub fn locations(&self) -> usize {
        self.locations
    }
    /// Returns `true` while this node is still joining a ring.
    pub fn joining(&self) -> bool {
        self.joining
    }
    /// Returns `true` once joined and the finger table was filled.
    pub fn stable(&self) -> bool {
        self.stable
    }
    /// Distinct targets currently being searched for.
    pub fn searches(&self) -> usize {
        self.searches
    }
    pub fn stabilization_rounds(&self) -> u64 {
        self.stabilization_rounds
    }
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

impl From<&Actor> for Info {
    fn from(actor: &Actor) -> Self {
        Self {
            id: *actor.id(),
            local_addr: actor.local_addr(),
            bits: actor.space().bits(),
            successor: actor.successor(),
            predecessor: actor.predecessor(),
            locations: actor.locations().len(),
            joining: actor.joining(),
            stable: actor.stable(),
            searches: actor.searches.len(),
            stabilization_rounds: actor.stabilizer.rounds(),
            statistics: actor.statistics(),
        }
    }
}
