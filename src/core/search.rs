//! Collapses concurrent lookups for the same target into one.

use std::collections::HashMap;

use flume::Sender;

use crate::common::{between_right_incl, Id, Node};
use crate::core::lookup::{LookupId, LookupResult};
use crate::error::LookupError;

pub type LookupResponse = Result<LookupResult, LookupError>;

#[derive(Debug, Clone)]
/// Someone interested in the outcome of a search.
pub enum Waiter {
    Sender(Sender<LookupResponse>),
    /// Refresh of the successor wedge at this index.
    FixFinger(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Returned by registrations, used to stop waiting.
pub struct SearchHandle {
    target: Id,
    waiter: u64,
}

impl SearchHandle {
    pub fn target(&self) -> &Id {
        &self.target
    }
}

#[derive(Debug)]
struct Search {
    lookup: Option<LookupId>,
    waiters: Vec<(u64, Waiter)>,
    /// Last `(candidate, successor]` interval reported by a hop.
    interval: Option<(Node, Node)>,
}

#[derive(Debug, Default)]
/// In-flight searches keyed by target.
pub struct SearchDeduplicator {
    searches: HashMap<Id, Search>,
    next_waiter: u64,
}

impl SearchDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.searches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.searches.is_empty()
    }

    pub fn is_searching(&self, target: &Id) -> bool {
        self.searches.contains_key(target)
    }

    pub fn lookup(&self, target: &Id) -> Option<LookupId> {
        self.searches.get(target).and_then(|search| search.lookup)
    }

    pub fn waiters(&self, target: &Id) -> usize {
        self.searches
            .get(target)
            .map(|search| search.waiters.len())
            .unwrap_or(0)
    }

    /// An interval `(predecessor, successor]` holding `target`, observed by
    /// any in-flight search.
    pub fn test(&self, target: &Id) -> Option<(Node, Node)> {
        self.searches
            .values()
            .filter_map(|search| search.interval)
            .find(|(predecessor, successor)| {
                between_right_incl(&predecessor.id, &successor.id, target)
            })
    }

    // === Public Methods ===

    /// Add `waiter` to the search for `target`, creating it if needed.
    ///
    /// Returns true as second element if a new search has to be started.
    pub fn register(&mut self, target: Id, waiter: Waiter) -> (SearchHandle, bool) {
        let id = self.next_waiter;
        self.next_waiter = self.next_waiter.wrapping_add(1);

        let mut is_new = false;
        let search = self.searches.entry(target).or_insert_with(|| {
            is_new = true;
            Search {
                lookup: None,
                waiters: Vec::new(),
                interval: None,
            }
        });
        search.waiters.push((id, waiter));

        (SearchHandle { target, waiter: id }, is_new)
    }

    /// Record the lookup running on behalf of `target`.
    pub fn attach(&mut self, target: &Id, lookup: LookupId) {
        if let Some(search) = self.searches.get_mut(target) {
            search.lookup = Some(lookup);
        }
    }

    /// Remember that `candidate` reported `successor` as its successor.
    pub fn observe(&mut self, target: &Id, candidate: Node, successor: Node) {
        if candidate.id == successor.id {
            return;
        }

        if let Some(search) = self.searches.get_mut(target) {
            search.interval = Some((candidate, successor));
        }
    }

    /// Stop waiting. The search keeps running even with no waiters left.
    pub fn remove_waiter(&mut self, handle: &SearchHandle) -> bool {
        let Some(search) = self.searches.get_mut(&handle.target) else {
            return false;
        };

        let before = search.waiters.len();
        search.waiters.retain(|(id, _)| *id != handle.waiter);

        before != search.waiters.len()
    }

    /// Remove the search and hand back its waiters, each to receive the
    /// same result exactly once.
    pub fn complete(&mut self, target: &Id) -> Vec<Waiter> {
        self.searches
            .remove(target)
            .map(|search| search.waiters.into_iter().map(|(_, w)| w).collect())
            .unwrap_or_default()
    }

    /// Remove every search, for shutdown.
    pub fn drain(&mut self) -> Vec<Waiter> {
        self.searches
            .drain()
            .flat_map(|(_, search)| search.waiters.into_iter().map(|(_, w)| w))
            .collect()
    }
}
