//! UDP transport.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

use tracing::{trace, warn};

use crate::common::{Message, MessageType};

use super::{is_routable, Transport, TransportError, TransportEvent, MTU};

/// Default port, 0 lets the OS pick one.
pub const DEFAULT_PORT: u16 = 0;

#[derive(Debug)]
/// A non blocking UdpSocket speaking bencoded ring messages.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    connected: VecDeque<(SocketAddr, Result<(), TransportError>)>,
}

impl UdpTransport {
    pub fn bind(address: SocketAddr) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(address)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(UdpTransport {
            socket,
            local_addr,
            connected: VecDeque::new(),
        })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// UDP is connectionless, any routable address is connected at once.
    fn connect(&mut self, address: SocketAddr) {
        let result = if is_routable(&address) {
            Ok(())
        } else {
            Err(TransportError::InvalidAddress(address))
        };

        self.connected.push_back((address, result));
    }

    fn send(&mut self, address: SocketAddr, message: &Message) -> Result<(), TransportError> {
        self.socket.send_to(&message.to_bytes()?, address)?;
        trace!(context = "socket_message_sending", ?message, ?address);

        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if let Some((address, result)) = self.connected.pop_front() {
            return Some(TransportEvent::Connected { address, result });
        }

        let mut buf = [0u8; MTU];

        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((amt, from)) => {
                    let bytes = &buf[..amt];

                    if from.port() == 0 {
                        trace!(
                            context = "socket_validation",
                            message = "Message from port 0"
                        );
                        continue;
                    }

                    match Message::from_bytes(bytes) {
                        Ok(message) => {
                            trace!(
                                context = "socket_message_receiving",
                                ?message,
                                ?from,
                                kind = match message.message_type {
                                    MessageType::Request(_) => "request",
                                    MessageType::Response(_) => "response",
                                    MessageType::Error(_) => "error",
                                },
                            );

                            return Some(TransportEvent::Message { from, message });
                        }
                        Err(error) => {
                            trace!(
                                context = "socket_error",
                                ?error,
                                ?from,
                                message = ?String::from_utf8_lossy(bytes),
                                "Received invalid Bencode message."
                            );
                        }
                    }
                }
                Err(error) => {
                    match error.kind() {
                        ErrorKind::WouldBlock => {}
                        // ICMP port unreachable surfaces here on some platforms.
                        ErrorKind::ConnectionReset => continue,
                        _ => warn!("IO error {error}"),
                    }

                    return None;
                }
            }
        }
    }
}
