//! Core ring logic - pure computation with no direct I/O.
//!
//! Contains the state machines (`lookup`, `join`, `stabilization`), the
//! `search` deduplicator, the local `ring` view, the `server` request handler
//! and `statistics`. All I/O orchestration lives in `actor/`, which calls
//! into this module.

pub(crate) mod join;
pub(crate) mod lookup;
pub(crate) mod ring;
pub(crate) mod search;
pub(crate) mod server;
pub(crate) mod stabilization;
pub(crate) mod statistics;
