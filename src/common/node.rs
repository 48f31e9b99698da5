//! Struct and implementation of a node on the ring
use std::fmt::{self, Debug, Formatter};
use std::net::SocketAddr;

use crate::common::Id;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// A ring member: its identifier and the address it is reachable at.
pub struct Node {
    pub id: Id,
    pub address: SocketAddr,
}

impl Node {
    /// Creates a new Node from an id and socket address.
    pub fn new(id: Id, address: SocketAddr) -> Node {
        Node { id, address }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &format_args!("{}", self.id))
            .field("address", &self.address)
            .finish()
    }
}
