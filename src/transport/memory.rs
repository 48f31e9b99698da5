//! In process network for simulations and tests.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use flume::{Receiver, Sender};
use tracing::trace;

use crate::common::Message;

use super::{is_routable, Transport, TransportError, TransportEvent};

type Datagram = (SocketAddr, Box<[u8]>);

#[derive(Debug, Clone, Default)]
/// Addresses and inboxes of every [MemoryTransport] bound to this network.
pub struct MemoryNetwork {
    inboxes: Arc<Mutex<HashMap<SocketAddr, Sender<Datagram>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a transport to `address`, replacing whatever was bound there.
    pub fn bind(&self, address: SocketAddr) -> MemoryTransport {
        let (sender, receiver) = flume::unbounded();

        self.lock().insert(address, sender);

        MemoryTransport {
            address,
            network: self.clone(),
            inbox: receiver,
            connected: VecDeque::new(),
        }
    }

    /// Unbind `address`, as if its node crashed.
    ///
    /// Messages to it are dropped from now on, and connecting to it never
    /// completes.
    pub fn disconnect(&self, address: &SocketAddr) -> bool {
        self.lock().remove(address).is_some()
    }

    pub fn contains(&self, address: &SocketAddr) -> bool {
        self.lock().contains_key(address)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SocketAddr, Sender<Datagram>>> {
        self.inboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, from: SocketAddr, to: &SocketAddr, bytes: Box<[u8]>) {
        let inbox = self.lock().get(to).cloned();

        match inbox {
            Some(inbox) => {
                // The receiving transport may be dropped without unbinding.
                let _ = inbox.send((from, bytes));
            }
            None => {
                trace!(context = "memory_network", ?from, ?to, "Dropped message to unbound address");
            }
        }
    }
}

#[derive(Debug)]
/// Transport over a [MemoryNetwork], messages are still bencoded.
pub struct MemoryTransport {
    address: SocketAddr,
    network: MemoryNetwork,
    inbox: Receiver<Datagram>,
    connected: VecDeque<(SocketAddr, Result<(), TransportError>)>,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Connecting to an unbound address never completes.
    fn connect(&mut self, address: SocketAddr) {
        if !is_routable(&address) {
            self.connected
                .push_back((address, Err(TransportError::InvalidAddress(address))));
            return;
        }

        if self.network.contains(&address) {
            self.connected.push_back((address, Ok(())));
        }
    }

    fn send(&mut self, address: SocketAddr, message: &Message) -> Result<(), TransportError> {
        let bytes = message.to_bytes()?;
        self.network
            .deliver(self.address, &address, bytes.into_boxed_slice());

        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if let Some((address, result)) = self.connected.pop_front() {
            return Some(TransportEvent::Connected { address, result });
        }

        while let Ok((from, bytes)) = self.inbox.try_recv() {
            match Message::from_bytes(&bytes) {
                Ok(message) => return Some(TransportEvent::Message { from, message }),
                Err(error) => {
                    trace!(context = "socket_error", ?error, ?from, "Received invalid Bencode message.");
                }
            }
        }

        None
    }
}
