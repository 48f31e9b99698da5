//! Message transports the actor talks through.

mod memory;
mod udp;

use std::fmt::Debug;
use std::net::SocketAddr;

use crate::common::Message;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::{UdpTransport, DEFAULT_PORT};

/// Largest datagram we expect to receive.
pub(crate) const MTU: usize = 2048;

/// Moves [Message]s between nodes.
///
/// A transport never blocks: results of [Transport::connect] and incoming
/// messages are both reported by [Transport::poll].
pub trait Transport: Debug + Send {
    /// Address other nodes can reach us at.
    fn local_addr(&self) -> SocketAddr;

    /// Start connecting to `address`, completion is reported as
    /// [TransportEvent::Connected].
    fn connect(&mut self, address: SocketAddr);

    /// Send a message to a connected address.
    fn send(&mut self, address: SocketAddr, message: &Message) -> Result<(), TransportError>;

    /// Next pending event, if any.
    fn poll(&mut self) -> Option<TransportEvent>;
}

#[derive(Debug)]
pub enum TransportEvent {
    Connected {
        address: SocketAddr,
        result: Result<(), TransportError>,
    },
    Message {
        from: SocketAddr,
        message: Message,
    },
}

#[derive(thiserror::Error, Debug)]
/// Transport errors.
pub enum TransportError {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] crate::Error),

    /// Unspecified ip or port 0.
    #[error("Can not connect to {0}")]
    InvalidAddress(SocketAddr),
}

/// Returns false for addresses nothing can be sent to.
pub(crate) fn is_routable(address: &SocketAddr) -> bool {
    !address.ip().is_unspecified() && address.port() != 0
}
