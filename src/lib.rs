#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Public modules
mod common;
mod core;
mod dht;
mod error;

pub mod actor;
#[cfg(feature = "async")]
pub mod async_dht;
pub mod transport;

pub use crate::common::{
    between, between_both_incl, between_left_incl, between_right_incl, messages, Backward,
    BoundedCache, ConnectionState, DecodeIdError, Direction, FingerTable, Forward, Id, IdSpace,
    Location, LocationCache, Node, PredecessorWedge, SuccessorWedge, Wedge, DEFAULT_BITS, MAX_BITS,
    ID_SIZE,
};
pub use crate::core::join::JoinResponse;
pub use crate::core::lookup::{LookupResult, DEFAULT_MAX_LOOKUP_HOPS, DEFAULT_MAX_LOOKUP_RETRIES};
pub use crate::core::ring::RingEvent;
pub use crate::core::search::{LookupResponse, SearchHandle};
pub use crate::core::stabilization::DEFAULT_STABILIZE_INTERVAL;
pub use crate::core::statistics::Statistics;
pub use actor::{Config, DEFAULT_REQUEST_TIMEOUT};
pub use dht::{Dht, DhtBuilder, DhtJoinError, DhtLookupError, DhtWasShutdown};
pub use error::{CallError, Error, JoinError, LookupError};

/// Alias Result to be the crate Result.
pub type Result<T, E = Error> = std::result::Result<T, E>;
