use std::net::SocketAddr;

use tracing::trace;

use crate::common::{MessageType, RequestSpecific};
use crate::core::server;

use super::Actor;

impl Actor {
    /// Handle an inbound request: answer it from the ring and send the
    /// response or error back to the requester.
    pub(super) fn handle_request(
        &mut self,
        from: SocketAddr,
        transaction_id: u32,
        request: RequestSpecific,
    ) {
        let requester_id = request.requester_id;

        let message_type = server::handle_request(&mut self.ring, from, request);

        if let MessageType::Error(error) = &message_type {
            trace!(context = "server", ?requester_id, ?from, ?error, "Rejected request");
        }

        self.dispatcher.respond(from, transaction_id, message_type);
    }
}
