//! Answers to the ring procedures a node exposes.

use std::net::SocketAddr;

use tracing::debug;

use crate::common::{
    AlertRequestArguments, ClosestPredecessorResponseArguments, ErrorSpecific,
    FindClosestPredecessorRequestArguments, MessageType, Node, NodeResponseArguments,
    PingResponseArguments, RequestSpecific, RequestTypeSpecific, ResponseSpecific,
};
use crate::core::ring::Ring;

/// Returns a response or an error for a request.
///
/// Only `notify` and `alert` change the ring, other procedures are read only.
pub fn handle_request(ring: &mut Ring, from: SocketAddr, request: RequestSpecific) -> MessageType {
    let requester_id = request.requester_id;
    let responder_id = *ring.id();

    if !ring.space().contains(&requester_id) {
        debug!(?requester_id, ?from, "Requester id outside the ring");

        return MessageType::Error(ErrorSpecific::protocol_error("Id outside the ring"));
    }

    let ack = || MessageType::Response(ResponseSpecific::Ping(PingResponseArguments { responder_id }));

    match request.request_type {
        RequestTypeSpecific::Ping => ack(),
        RequestTypeSpecific::GetSuccessor => {
            MessageType::Response(ResponseSpecific::Node(NodeResponseArguments {
                responder_id,
                node: Some(ring.successor()),
            }))
        }
        RequestTypeSpecific::GetPredecessor => {
            MessageType::Response(ResponseSpecific::Node(NodeResponseArguments {
                responder_id,
                node: ring.predecessor(),
            }))
        }
        RequestTypeSpecific::FindClosestPredecessor(FindClosestPredecessorRequestArguments {
            target,
        }) => {
            if !ring.space().contains(&target) {
                debug!(?target, ?requester_id, ?from, "Target outside the ring");

                return MessageType::Error(ErrorSpecific::protocol_error("Target outside the ring"));
            }

            let hop = ring.local_hop(&target);

            MessageType::Response(ResponseSpecific::ClosestPredecessor(
                ClosestPredecessorResponseArguments {
                    responder_id,
                    node: hop.closest,
                    successor: hop.successor,
                },
            ))
        }
        RequestTypeSpecific::Notify => {
            ring.notify(Node::new(requester_id, from));
            ack()
        }
        RequestTypeSpecific::Alert(AlertRequestArguments { node }) => {
            ring.alert(node, requester_id);
            ack()
        }
    }
}

#[cfg(test)]
mod test {
    use crate::common::{Id, IdSpace};

    use super::*;

    fn node(id: u64) -> Node {
        Node::new(
            Id::from(id),
            SocketAddr::from(([127, 0, 0, 1], 5000 + id as u16)),
        )
    }

    fn request(from: u64, request_type: RequestTypeSpecific) -> RequestSpecific {
        RequestSpecific {
            requester_id: Id::from(from),
            request_type,
        }
    }

    fn ring() -> Ring {
        let mut ring = Ring::new(node(80), IdSpace::new(8).unwrap());
        ring.notice(node(200), Id::from(200));
        ring
    }

    #[test]
    fn closest_predecessor_piggybacks_successor() {
        let mut ring = ring();

        let response = handle_request(
            &mut ring,
            node(10).address,
            request(
                10,
                RequestTypeSpecific::FindClosestPredecessor(FindClosestPredecessorRequestArguments {
                    target: Id::from(90),
                }),
            ),
        );

        assert_eq!(
            response,
            MessageType::Response(ResponseSpecific::ClosestPredecessor(
                ClosestPredecessorResponseArguments {
                    responder_id: Id::from(80),
                    node: node(80),
                    successor: node(200),
                }
            ))
        );
    }

    #[test]
    fn notify_sets_predecessor() {
        let mut ring = ring();

        let predecessor = |ring: &mut Ring| {
            handle_request(
                ring,
                node(10).address,
                request(10, RequestTypeSpecific::GetPredecessor),
            )
        };

        assert_eq!(
            predecessor(&mut ring),
            MessageType::Response(ResponseSpecific::Node(NodeResponseArguments {
                responder_id: Id::from(80),
                node: None,
            }))
        );

        handle_request(
            &mut ring,
            node(10).address,
            request(10, RequestTypeSpecific::Notify),
        );

        assert_eq!(
            predecessor(&mut ring),
            MessageType::Response(ResponseSpecific::Node(NodeResponseArguments {
                responder_id: Id::from(80),
                node: Some(node(10)),
            }))
        );
    }

    #[test]
    fn reject_ids_outside_the_ring() {
        let mut ring = ring();

        let response = handle_request(
            &mut ring,
            node(10).address,
            request(1000, RequestTypeSpecific::Ping),
        );

        assert!(matches!(response, MessageType::Error(ErrorSpecific { code: 203, .. })));
    }
}
