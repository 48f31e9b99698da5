//! Finger table: successor wedges at exponentially growing offsets, plus the
//! predecessor wedge.

use std::collections::HashSet;
use std::fmt::Debug;
use std::marker::PhantomData;

use crate::common::{between, between_left_incl, Id, IdSpace, LocationCache};

/// Which end of a [Wedge] its head gravitates to.
pub trait Direction: Debug + Clone + Copy + Default {
    /// Returns true if `candidate` is a better head than `current` for `[start, end)`.
    fn prefer(start: &Id, end: &Id, candidate: &Id, current: &Id) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
/// Keeps the node closest to the start of the wedge.
pub struct Forward;

#[derive(Debug, Clone, Copy, Default)]
/// Keeps the node closest to the end of the wedge.
pub struct Backward;

// Distances are measured modulo 2^160; from a fixed origin their ordering
// does not depend on the ring width.

impl Direction for Forward {
    fn prefer(start: &Id, _end: &Id, candidate: &Id, current: &Id) -> bool {
        candidate.wrapping_sub(start) < current.wrapping_sub(start)
    }
}

impl Direction for Backward {
    fn prefer(_start: &Id, end: &Id, candidate: &Id, current: &Id) -> bool {
        end.wrapping_sub(candidate) < end.wrapping_sub(current)
    }
}

#[derive(Debug, Clone)]
/// Half open interval `[start, end)` and the best known node inside it.
pub struct Wedge<D: Direction> {
    start: Id,
    end: Id,
    first: Option<Id>,
    alive: bool,
    direction: PhantomData<D>,
}

pub type SuccessorWedge = Wedge<Forward>;
pub type PredecessorWedge = Wedge<Backward>;

impl<D: Direction> Wedge<D> {
    pub fn new(start: Id, end: Id) -> Self {
        Wedge {
            start,
            end,
            first: None,
            alive: false,
            direction: PhantomData,
        }
    }

    // === Getters ===

    pub fn start(&self) -> &Id {
        &self.start
    }

    pub fn end(&self) -> &Id {
        &self.end
    }

    /// The recorded node, dead or alive.
    pub fn first(&self) -> Option<&Id> {
        self.first.as_ref()
    }

    pub fn alive(&self) -> bool {
        self.alive
    }

    /// The recorded node, if it is alive.
    pub fn head(&self) -> Option<&Id> {
        self.first.as_ref().filter(|_| self.alive)
    }

    pub fn contains(&self, id: &Id) -> bool {
        between_left_incl(&self.start, &self.end, id)
    }

    // === Public Methods ===

    /// Record `candidate` if it falls in the wedge and beats the current head.
    ///
    /// Returns true if the wedge changed.
    pub fn offer(&mut self, candidate: &Id) -> bool {
        if !self.contains(candidate) {
            return false;
        }

        let replace = match self.head() {
            None => true,
            Some(current) if current == candidate => false,
            Some(current) => D::prefer(&self.start, &self.end, candidate, current),
        };

        if replace {
            self.set(*candidate);
        }

        replace
    }

    /// Unconditionally record `id`, or clear the wedge if `id` is outside it.
    pub fn assign(&mut self, id: &Id) -> bool {
        if !self.contains(id) {
            self.clear();
            return false;
        }

        self.set(*id);
        true
    }

    pub fn clear(&mut self) {
        self.first = None;
        self.alive = false;
    }

    /// Returns true if `id` was this wedge's node.
    pub fn mark_dead(&mut self, id: &Id) -> bool {
        if self.first.as_ref() == Some(id) {
            self.alive = false;
            return true;
        }

        false
    }

    fn set(&mut self, id: Id) {
        self.first = Some(id);
        self.alive = true;
    }
}

#[derive(Debug, Clone)]
pub struct FingerTable {
    id: Id,
    space: IdSpace,
    /// Wedge `i` covers `[id + 2^i, id + 2^(i+1))`.
    successors: Box<[SuccessorWedge]>,
    /// Covers `[id + 1, id)`.
    predecessor: PredecessorWedge,
}

impl FingerTable {
    pub fn new(id: Id, space: IdSpace) -> Self {
        let bits = space.bits();

        let successors = (0..bits)
            .map(|i| {
                let end = if i + 1 == bits {
                    id
                } else {
                    space.successor_id(&id, i + 1)
                };

                SuccessorWedge::new(space.successor_id(&id, i), end)
            })
            .collect();

        FingerTable {
            id,
            space,
            successors,
            predecessor: PredecessorWedge::new(space.increment(&id), id),
        }
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn space(&self) -> &IdSpace {
        &self.space
    }

    pub fn successor_wedges(&self) -> &[SuccessorWedge] {
        &self.successors
    }

    pub fn predecessor_wedge(&self) -> &PredecessorWedge {
        &self.predecessor
    }

    /// Head of the lowest populated live successor wedge.
    pub fn successor(&self) -> Option<Id> {
        self.successors.iter().find_map(|wedge| wedge.head().copied())
    }

    pub fn predecessor(&self) -> Option<Id> {
        self.predecessor.head().copied()
    }

    /// Index of the successor wedge holding `id`, None for our own id.
    pub fn successor_wedge_index(&self, id: &Id) -> Option<usize> {
        self.space.distance(&self.id, id).bits().checked_sub(1)
    }

    /// Alive nodes referenced by any wedge.
    pub fn nodes(&self) -> HashSet<Id> {
        self.successors
            .iter()
            .filter_map(|wedge| wedge.head().copied())
            .chain(self.predecessor())
            .collect()
    }

    /// Farthest alive node strictly inside `(self, target)`, or our own id.
    ///
    /// The predecessor wedge comes first, then successor wedges from the
    /// highest to the lowest.
    pub fn closest_preceding(&self, target: &Id) -> Id {
        if let Some(predecessor) = self.predecessor() {
            if between(&self.id, target, &predecessor) {
                return predecessor;
            }
        }

        self.successors
            .iter()
            .rev()
            .filter_map(|wedge| wedge.head())
            .find(|head| between(&self.id, target, head))
            .copied()
            .unwrap_or(self.id)
    }

    // === Public Methods ===

    /// Offer `candidate` to the successor wedge it falls in.
    pub fn notice_possible_new_successor(&mut self, candidate: &Id) -> bool {
        match self.successor_wedge_index(candidate) {
            Some(index) => self.update_successor_wedge(index, candidate),
            None => false,
        }
    }

    /// Adopt `candidate` as predecessor if there is none or it sits in
    /// `(predecessor, self)`.
    pub fn notice_possible_new_predecessor(&mut self, candidate: &Id) -> bool {
        if *candidate == self.id {
            return false;
        }

        self.predecessor.offer(candidate)
    }

    /// Replace the head of wedge `index` if `candidate` falls inside it and is
    /// closer to its start, or the head is dead or unset.
    pub fn update_successor_wedge(&mut self, index: usize, candidate: &Id) -> bool {
        self.successors
            .get_mut(index)
            .map(|wedge| wedge.offer(candidate))
            .unwrap_or(false)
    }

    /// Record the authoritative successor of the wedge start, clearing the
    /// wedge if it lies beyond it.
    pub fn fix_successor_wedge(&mut self, index: usize, successor: &Id) -> bool {
        self.successors
            .get_mut(index)
            .map(|wedge| wedge.assign(successor))
            .unwrap_or(false)
    }

    pub fn clear_successor_wedge(&mut self, index: usize) {
        if let Some(wedge) = self.successors.get_mut(index) {
            wedge.clear();
        }
    }

    pub fn clear_predecessor(&mut self) {
        self.predecessor.clear();
    }

    /// Mark `id` dead in every wedge and refill those wedges with the best
    /// alive candidates `locations` knows about.
    ///
    /// Returns true if any wedge referenced `id`.
    pub fn repair(&mut self, id: &Id, locations: &LocationCache) -> bool {
        let mut affected = false;

        for wedge in self.successors.iter_mut() {
            if wedge.mark_dead(id) {
                affected = true;

                match locations.first_in(wedge.start(), wedge.end()) {
                    Some(replacement) if replacement != *id => {
                        wedge.assign(&replacement);
                    }
                    _ => wedge.clear(),
                }
            }
        }

        if self.predecessor.mark_dead(id) {
            affected = true;

            match locations.last_in(self.predecessor.start(), self.predecessor.end()) {
                Some(replacement) if replacement != *id => {
                    self.predecessor.assign(&replacement);
                }
                _ => self.predecessor.clear(),
            }
        }

        affected
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use rand::Rng;

    use crate::common::Node;

    use super::*;

    fn id(value: u64) -> Id {
        Id::from(value)
    }

    fn table(me: u64) -> FingerTable {
        FingerTable::new(id(me), IdSpace::new(8).unwrap())
    }

    #[test]
    fn wedges_partition_the_ring() {
        let table = table(200);
        let wedges = table.successor_wedges();

        assert_eq!(wedges.len(), 8);
        assert_eq!((wedges[0].start(), wedges[0].end()), (&id(201), &id(202)));
        assert_eq!((wedges[6].start(), wedges[6].end()), (&id(8), &id(72)));
        assert_eq!((wedges[7].start(), wedges[7].end()), (&id(72), &id(200)));

        for n in 0..256 {
            let covering = wedges.iter().filter(|w| w.contains(&id(n))).count();
            assert_eq!(covering, if n == 200 { 0 } else { 1 });
        }

        assert!(table.predecessor_wedge().contains(&id(199)));
        assert!(!table.predecessor_wedge().contains(&id(200)));
    }

    #[test]
    fn successor_is_lowest_live_wedge() {
        let mut table = table(10);
        assert_eq!(table.successor(), None);

        assert!(table.notice_possible_new_successor(&id(200)));
        assert!(table.notice_possible_new_successor(&id(80)));
        assert_eq!(table.successor(), Some(id(80)));

        // Same wedge as 80 ([74, 138)) but closer to its start.
        assert!(table.notice_possible_new_successor(&id(75)));
        assert!(!table.notice_possible_new_successor(&id(100)));
        assert_eq!(table.successor(), Some(id(75)));

        assert!(!table.notice_possible_new_successor(&id(10)));
    }

    #[test]
    fn update_successor_wedge() {
        let mut table = table(10);
        let address = SocketAddr::from(([127, 0, 0, 1], 6881));

        // Wedge 6 is [74, 138).
        assert!(!table.update_successor_wedge(6, &id(140)));
        assert!(!table.update_successor_wedge(6, &id(73)));
        assert!(!table.update_successor_wedge(8, &id(80)));

        assert!(table.update_successor_wedge(6, &id(100)));
        assert!(!table.update_successor_wedge(6, &id(120)));
        assert!(!table.update_successor_wedge(6, &id(100)));
        assert!(table.update_successor_wedge(6, &id(74)));
        assert_eq!(table.successor_wedges()[6].head(), Some(&id(74)));

        // Once its head died, the wedge takes a farther candidate.
        let mut locations = LocationCache::new();
        locations.upsert(Node::new(id(74), address), id(10));
        locations.mark_dead(&id(74));
        table.repair(&id(74), &locations);
        assert_eq!(table.successor_wedges()[6].head(), None);

        assert!(table.update_successor_wedge(6, &id(130)));
        assert_eq!(table.successor(), Some(id(130)));
    }

    #[test]
    fn notice_predecessor_is_idempotent() {
        let mut table = table(100);

        assert!(table.notice_possible_new_predecessor(&id(50)));
        assert!(!table.notice_possible_new_predecessor(&id(50)));
        assert!(!table.notice_possible_new_predecessor(&id(20)));
        assert!(table.notice_possible_new_predecessor(&id(70)));
        assert!(!table.notice_possible_new_predecessor(&id(100)));
        assert_eq!(table.predecessor(), Some(id(70)));
    }

    #[test]
    fn closest_preceding_prefers_predecessor() {
        let mut table = table(10);
        table.notice_possible_new_successor(&id(20));
        table.notice_possible_new_successor(&id(80));
        table.notice_possible_new_predecessor(&id(250));

        assert_eq!(table.closest_preceding(&id(90)), id(80));
        assert_eq!(table.closest_preceding(&id(80)), id(20));
        assert_eq!(table.closest_preceding(&id(15)), id(10));
        assert_eq!(table.closest_preceding(&id(5)), id(250));
    }

    #[test]
    fn closest_preceding_stays_in_range() {
        let space = IdSpace::new(8).unwrap();
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let me = space.random_id();
            let mut table = FingerTable::new(me, space);

            for _ in 0..rng.gen_range(0..12) {
                table.notice_possible_new_successor(&space.random_id());
            }
            if rng.gen_bool(0.5) {
                table.notice_possible_new_predecessor(&space.random_id());
            }
            for index in 0..8 {
                if rng.gen_bool(0.2) {
                    table.clear_successor_wedge(index);
                }
            }

            for _ in 0..20 {
                let target = space.random_id();
                let closest = table.closest_preceding(&target);

                assert!(closest == me || between(&me, &target, &closest));
            }
        }
    }

    #[test]
    fn fix_wedge_outside_clears() {
        let mut table = table(10);
        table.notice_possible_new_successor(&id(80));
        let index = table.successor_wedge_index(&id(80)).unwrap();

        assert!(!table.fix_successor_wedge(index, &id(200)));
        assert_eq!(table.successor(), None);

        assert!(table.fix_successor_wedge(index, &id(100)));
        assert_eq!(table.successor(), Some(id(100)));
    }

    #[test]
    fn repair_uses_location_cache() {
        let address = SocketAddr::from(([127, 0, 0, 1], 6881));
        let mut locations = LocationCache::new();
        let mut table = table(10);

        for value in [80, 100, 250, 240] {
            locations.upsert(Node::new(id(value), address), id(10));
            table.notice_possible_new_successor(&id(value));
        }
        table.notice_possible_new_predecessor(&id(250));
        assert_eq!(table.successor(), Some(id(80)));

        locations.mark_dead(&id(80));
        assert!(table.repair(&id(80), &locations));
        assert_eq!(table.successor(), Some(id(100)));

        locations.mark_dead(&id(250));
        assert!(table.repair(&id(250), &locations));
        assert_eq!(table.predecessor(), Some(id(240)));

        assert!(!table.repair(&id(7), &locations));
    }
}
