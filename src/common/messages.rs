//! Serialize and deserialize ring RPC messages.

mod internal;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::common::{Id, Node, ID_SIZE};
use crate::{Error, Result};

/// "CH" version 01
pub const VERSION: [u8; 4] = [67, 72, 0, 1];

#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub transaction_id: u32,

    /// The version of the requester or responder.
    pub version: Option<[u8; 4]>,

    pub message_type: MessageType,
}

#[derive(Debug, PartialEq, Clone)]
pub enum MessageType {
    Request(RequestSpecific),

    Response(ResponseSpecific),

    Error(ErrorSpecific),
}

#[derive(Debug, PartialEq, Clone)]
pub struct ErrorSpecific {
    pub code: i32,
    pub description: String,
}

impl ErrorSpecific {
    pub fn method_unknown() -> Self {
        ErrorSpecific {
            code: 204,
            description: "Method Unknown".to_string(),
        }
    }

    pub fn protocol_error(description: &str) -> Self {
        ErrorSpecific {
            code: 203,
            description: description.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct RequestSpecific {
    pub requester_id: Id,
    pub request_type: RequestTypeSpecific,
}

#[derive(Debug, PartialEq, Clone)]
pub enum RequestTypeSpecific {
    Ping,
    GetSuccessor,
    GetPredecessor,
    FindClosestPredecessor(FindClosestPredecessorRequestArguments),
    /// The requester might be our predecessor.
    Notify,
    Alert(AlertRequestArguments),
}

#[derive(Debug, PartialEq, Clone)]
pub enum ResponseSpecific {
    /// Also acknowledges notify and alert.
    Ping(PingResponseArguments),
    /// Answers get_successor and get_predecessor.
    Node(NodeResponseArguments),
    ClosestPredecessor(ClosestPredecessorResponseArguments),
}

// === PING ===

#[derive(Debug, PartialEq, Clone)]
pub struct PingResponseArguments {
    pub responder_id: Id,
}

// === GET_SUCCESSOR / GET_PREDECESSOR ===

#[derive(Debug, PartialEq, Clone)]
pub struct NodeResponseArguments {
    pub responder_id: Id,
    pub node: Option<Node>,
}

// === FIND_CLOSEST_PREDECESSOR ===

#[derive(Debug, PartialEq, Clone)]
pub struct FindClosestPredecessorRequestArguments {
    pub target: Id,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ClosestPredecessorResponseArguments {
    pub responder_id: Id,
    /// Closest node preceding the target that the responder knows.
    pub node: Node,
    /// The responder's own successor.
    pub successor: Node,
}

// === ALERT ===

#[derive(Debug, PartialEq, Clone)]
pub struct AlertRequestArguments {
    pub node: Node,
}

impl Message {
    fn into_serde_message(self) -> internal::RingMessage {
        internal::RingMessage {
            transaction_id: self.transaction_id.to_be_bytes(),
            version: self.version,
            variant: match self.message_type {
                MessageType::Request(RequestSpecific {
                    requester_id,
                    request_type,
                }) => {
                    let id = requester_id.0;

                    internal::RingMessageVariant::Request(match request_type {
                        RequestTypeSpecific::Ping => internal::RingRequestSpecific::Ping {
                            arguments: internal::RingIdArguments { id },
                        },
                        RequestTypeSpecific::GetSuccessor => {
                            internal::RingRequestSpecific::GetSuccessor {
                                arguments: internal::RingIdArguments { id },
                            }
                        }
                        RequestTypeSpecific::GetPredecessor => {
                            internal::RingRequestSpecific::GetPredecessor {
                                arguments: internal::RingIdArguments { id },
                            }
                        }
                        RequestTypeSpecific::FindClosestPredecessor(args) => {
                            internal::RingRequestSpecific::FindClosestPredecessor {
                                arguments: internal::RingFindClosestPredecessorRequestArguments {
                                    id,
                                    target: args.target.0,
                                },
                            }
                        }
                        RequestTypeSpecific::Notify => internal::RingRequestSpecific::Notify {
                            arguments: internal::RingIdArguments { id },
                        },
                        RequestTypeSpecific::Alert(args) => internal::RingRequestSpecific::Alert {
                            arguments: internal::RingAlertRequestArguments {
                                id,
                                node: node_to_bytes(&args.node).into(),
                            },
                        },
                    })
                }
                MessageType::Response(res) => internal::RingMessageVariant::Response(match res {
                    ResponseSpecific::Ping(args) => internal::RingResponseSpecific::Ping {
                        arguments: internal::RingIdArguments {
                            id: args.responder_id.0,
                        },
                    },
                    ResponseSpecific::Node(args) => internal::RingResponseSpecific::Node {
                        arguments: internal::RingNodeResponseArguments {
                            id: args.responder_id.0,
                            node: args
                                .node
                                .map(|node| node_to_bytes(&node))
                                .unwrap_or_default()
                                .into(),
                        },
                    },
                    ResponseSpecific::ClosestPredecessor(args) => {
                        internal::RingResponseSpecific::ClosestPredecessor {
                            arguments: internal::RingClosestPredecessorResponseArguments {
                                id: args.responder_id.0,
                                node: node_to_bytes(&args.node).into(),
                                successor: node_to_bytes(&args.successor).into(),
                            },
                        }
                    }
                }),
                MessageType::Error(err) => {
                    internal::RingMessageVariant::Error(internal::RingErrorSpecific {
                        error_info: (err.code, err.description),
                    })
                }
            },
        }
    }

    fn from_serde_message(msg: internal::RingMessage) -> Result<Message> {
        Ok(Message {
            transaction_id: u32::from_be_bytes(msg.transaction_id),
            version: msg.version,
            message_type: match msg.variant {
                internal::RingMessageVariant::Request(req_variant) => {
                    MessageType::Request(match req_variant {
                        internal::RingRequestSpecific::Ping { arguments } => RequestSpecific {
                            requester_id: Id(arguments.id),
                            request_type: RequestTypeSpecific::Ping,
                        },
                        internal::RingRequestSpecific::GetSuccessor { arguments } => {
                            RequestSpecific {
                                requester_id: Id(arguments.id),
                                request_type: RequestTypeSpecific::GetSuccessor,
                            }
                        }
                        internal::RingRequestSpecific::GetPredecessor { arguments } => {
                            RequestSpecific {
                                requester_id: Id(arguments.id),
                                request_type: RequestTypeSpecific::GetPredecessor,
                            }
                        }
                        internal::RingRequestSpecific::FindClosestPredecessor { arguments } => {
                            RequestSpecific {
                                requester_id: Id(arguments.id),
                                request_type: RequestTypeSpecific::FindClosestPredecessor(
                                    FindClosestPredecessorRequestArguments {
                                        target: Id(arguments.target),
                                    },
                                ),
                            }
                        }
                        internal::RingRequestSpecific::Notify { arguments } => RequestSpecific {
                            requester_id: Id(arguments.id),
                            request_type: RequestTypeSpecific::Notify,
                        },
                        internal::RingRequestSpecific::Alert { arguments } => RequestSpecific {
                            requester_id: Id(arguments.id),
                            request_type: RequestTypeSpecific::Alert(AlertRequestArguments {
                                node: bytes_to_node(&arguments.node)?,
                            }),
                        },
                    })
                }

                internal::RingMessageVariant::Response(res_variant) => {
                    MessageType::Response(match res_variant {
                        internal::RingResponseSpecific::Ping { arguments } => {
                            ResponseSpecific::Ping(PingResponseArguments {
                                responder_id: Id(arguments.id),
                            })
                        }
                        internal::RingResponseSpecific::Node { arguments } => {
                            ResponseSpecific::Node(NodeResponseArguments {
                                responder_id: Id(arguments.id),
                                node: if arguments.node.is_empty() {
                                    None
                                } else {
                                    Some(bytes_to_node(&arguments.node)?)
                                },
                            })
                        }
                        internal::RingResponseSpecific::ClosestPredecessor { arguments } => {
                            ResponseSpecific::ClosestPredecessor(
                                ClosestPredecessorResponseArguments {
                                    responder_id: Id(arguments.id),
                                    node: bytes_to_node(&arguments.node)?,
                                    successor: bytes_to_node(&arguments.successor)?,
                                },
                            )
                        }
                    })
                }

                internal::RingMessageVariant::Error(err) => MessageType::Error(ErrorSpecific {
                    code: err.error_info.0,
                    description: err.error_info.1,
                }),
            },
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.clone().into_serde_message().to_bytes()?)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message> {
        Message::from_serde_message(internal::RingMessage::from_bytes(bytes.as_ref())?)
    }

    /// Return the Id of the sender of the Message, errors carry none.
    pub fn get_author_id(&self) -> Option<Id> {
        let id = match &self.message_type {
            MessageType::Request(arguments) => arguments.requester_id,
            MessageType::Response(response_variant) => match response_variant {
                ResponseSpecific::Ping(arguments) => arguments.responder_id,
                ResponseSpecific::Node(arguments) => arguments.responder_id,
                ResponseSpecific::ClosestPredecessor(arguments) => arguments.responder_id,
            },
            MessageType::Error(_) => {
                return None;
            }
        };

        Some(id)
    }
}

impl RequestTypeSpecific {
    /// The procedure name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            RequestTypeSpecific::Ping => "ping",
            RequestTypeSpecific::GetSuccessor => "get_successor",
            RequestTypeSpecific::GetPredecessor => "get_predecessor",
            RequestTypeSpecific::FindClosestPredecessor(_) => "find_closest_predecessor",
            RequestTypeSpecific::Notify => "notify",
            RequestTypeSpecific::Alert(_) => "alert",
        }
    }
}

const NODE4_BYTE_SIZE: usize = ID_SIZE + 6;
const NODE6_BYTE_SIZE: usize = ID_SIZE + 18;

pub fn sockaddr_to_bytes(sockaddr: &SocketAddr) -> Vec<u8> {
    let mut bytes = match sockaddr.ip() {
        IpAddr::V4(ip) => ip.octets().to_vec(),
        IpAddr::V6(ip) => ip.octets().to_vec(),
    };
    bytes.extend(sockaddr.port().to_be_bytes());

    bytes
}

fn bytes_to_sockaddr(bytes: &[u8]) -> Result<SocketAddr> {
    let (ip, port): (IpAddr, &[u8]) = match bytes.len() {
        6 => {
            let octets: [u8; 4] = bytes[..4]
                .try_into()
                .map_err(|_| Error::InvalidNodeSize(bytes.len()))?;
            (Ipv4Addr::from(octets).into(), &bytes[4..])
        }
        18 => {
            let octets: [u8; 16] = bytes[..16]
                .try_into()
                .map_err(|_| Error::InvalidNodeSize(bytes.len()))?;
            (Ipv6Addr::from(octets).into(), &bytes[16..])
        }
        len => return Err(Error::InvalidNodeSize(len)),
    };

    let port: [u8; 2] = port
        .try_into()
        .map_err(|_| Error::InvalidNodeSize(bytes.len()))?;

    Ok(SocketAddr::new(ip, u16::from_be_bytes(port)))
}

/// Compact node: 20 bytes id, then 4 or 16 bytes ip, then 2 bytes port.
pub fn node_to_bytes(node: &Node) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(NODE6_BYTE_SIZE);
    bytes.extend(node.id.0);
    bytes.extend(sockaddr_to_bytes(&node.address));

    bytes
}

pub fn bytes_to_node(bytes: &[u8]) -> Result<Node> {
    if bytes.len() != NODE4_BYTE_SIZE && bytes.len() != NODE6_BYTE_SIZE {
        return Err(Error::InvalidNodeSize(bytes.len()));
    }

    let id = Id::from_bytes(&bytes[..ID_SIZE])?;
    let address = bytes_to_sockaddr(&bytes[ID_SIZE..])?;

    Ok(Node::new(id, address))
}
