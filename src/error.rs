//! Main Crate Error

use std::net::SocketAddr;

use crate::common::{DecodeIdError, ErrorSpecific, Id};

#[derive(thiserror::Error, Debug)]
/// Chord crate error enum.
pub enum Error {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    #[error("Failed to parse packet bytes: {0}")]
    BencodeError(#[from] serde_bencode::Error),

    /// Indicates that an Id is not 20 bytes.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Indicates that a compact node is neither 26 nor 38 bytes.
    #[error("Invalid compact node size: {0}")]
    InvalidNodeSize(usize),

    /// Ring width outside `1..=160`.
    #[error("Invalid ring width: {0} bits")]
    InvalidWidth(usize),

    #[error("Id {id} does not fit in a {bits} bits ring")]
    IdOutsideRing { id: Id, bits: usize },

    #[error(transparent)]
    DecodeId(#[from] DecodeIdError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Failure of a single remote call, as seen by the operation that issued it.
pub enum CallError {
    /// Retries ran out, or the peer was already evicted.
    #[error("Peer is unreachable")]
    Unreachable,

    #[error("Remote error: {} {}", .0.code, .0.description)]
    Remote(ErrorSpecific),

    /// Wrong response type, or one naming nodes outside the ring.
    #[error("Unexpected response")]
    UnexpectedResponse,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors surfaced by find_successor and find_predecessor.
pub enum LookupError {
    /// Every path toward the target ended at an unreachable node.
    #[error("Lookup gave up after {retries} retries on unreachable nodes")]
    Unreachable { retries: usize },

    /// No hop could get closer to the target.
    #[error("Lookup for {target} stopped making progress")]
    NoProgress { target: Id },

    #[error("Lookup exceeded {0} hops")]
    MaxHops(usize),

    /// The node running the lookup was shut down.
    #[error("Lookup was abandoned")]
    Abandoned,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors joining an existing ring.
pub enum JoinError {
    #[error("Bootstrap node {0} is unreachable")]
    BootstrapUnreachable(SocketAddr),

    #[error("No bootstrap node to join through")]
    NoBootstrap,

    /// The bootstrap address answered with our own id.
    #[error("Refusing to bootstrap from ourselves")]
    SelfBootstrap,

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Join was superseded by a newer one")]
    Superseded,
}
