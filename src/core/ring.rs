//! Local view of the ring: our finger table and every peer we know about.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::common::{between, FingerTable, Id, IdSpace, LocationCache, Node};
use crate::core::lookup::HopReply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Ring membership changes seen by this node.
pub enum RingEvent {
    /// A node we did not know about.
    Joined(Node),
    /// Our successor or predecessor is now this node.
    Updated(Node),
    /// A failed node was forgotten.
    Left(Id),
}

#[derive(Debug)]
/// Routing state of one node.
pub struct Ring {
    me: Node,
    space: IdSpace,
    fingers: FingerTable,
    pub(crate) locations: LocationCache,

    events: Vec<RingEvent>,
    /// Successor and predecessor as of the last [Ring::drain_events].
    neighbours: (Node, Option<Node>),
}

impl Ring {
    pub fn new(me: Node, space: IdSpace) -> Self {
        Ring {
            me,
            space,
            fingers: FingerTable::new(me.id, space),
            locations: LocationCache::new(),

            events: Vec::new(),
            neighbours: (me, None),
        }
    }

    // === Getters ===

    pub fn me(&self) -> &Node {
        &self.me
    }

    pub fn id(&self) -> &Id {
        &self.me.id
    }

    pub fn space(&self) -> &IdSpace {
        &self.space
    }

    pub fn fingers(&self) -> &FingerTable {
        &self.fingers
    }

    pub fn locations(&self) -> &LocationCache {
        &self.locations
    }

    /// Resolve an identifier to a node, ourselves included.
    pub fn node(&self, id: &Id) -> Option<Node> {
        if *id == self.me.id {
            return Some(self.me);
        }

        self.locations.get(id).map(|location| *location.node())
    }

    /// Our successor, or ourselves when we know of no other node.
    pub fn successor(&self) -> Node {
        self.fingers
            .successor()
            .and_then(|id| self.node(&id))
            .unwrap_or(self.me)
    }

    pub fn predecessor(&self) -> Option<Node> {
        self.fingers.predecessor().and_then(|id| self.node(&id))
    }

    /// The known node farthest along `(self, target)`, or ourselves.
    ///
    /// Considers both the finger table and every alive cached location.
    pub fn closest_preceding(&self, target: &Id) -> Node {
        let finger = self.fingers.closest_preceding(target);
        let cached = self.locations.closest_preceding(&self.me.id, target);

        let best = match cached {
            Some(cached) if target.wrapping_sub(&cached) < target.wrapping_sub(&finger) => cached,
            _ => finger,
        };

        self.node(&best).unwrap_or(self.me)
    }

    /// Answer one lookup hop about `target` from local state.
    pub fn local_hop(&self, target: &Id) -> HopReply {
        HopReply {
            closest: self.closest_preceding(target),
            successor: self.successor(),
        }
    }

    /// Identifiers that must survive capacity enforcement.
    pub fn pinned(&self) -> HashSet<Id> {
        self.fingers.nodes()
    }

    // === Public Methods ===

    /// Membership changes since the last call, neighbour changes last.
    pub fn drain_events(&mut self) -> Vec<RingEvent> {
        let successor = self.successor();
        let predecessor = self.predecessor();
        let (old_successor, old_predecessor) = self.neighbours;

        let successor_changed = successor != old_successor && successor.id != self.me.id;
        if successor_changed {
            self.events.push(RingEvent::Updated(successor));
        }

        if predecessor != old_predecessor {
            if let Some(predecessor) = predecessor {
                if !(successor_changed && predecessor == successor) {
                    self.events.push(RingEvent::Updated(predecessor));
                }
            }
        }

        self.neighbours = (successor, predecessor);

        std::mem::take(&mut self.events)
    }

    /// Learn about `node`, reported by `source`.
    ///
    /// Recently evicted nodes are only accepted first hand. Returns true if
    /// the successor wedges changed.
    pub fn notice(&mut self, node: Node, source: Id) -> bool {
        if !self.accept(&node, &source) {
            return false;
        }

        if self.locations.upsert(node, source) {
            self.events.push(RingEvent::Joined(node));
        }

        if !self.locations.is_alive(&node.id) {
            return false;
        }

        let changed = self.fingers.notice_possible_new_successor(&node.id);
        if changed {
            debug!(context = "ring", me = ?self.me.id, successor = ?self.successor().id, "Successor wedge updated");
        }

        changed
    }

    /// `node` thinks it might be our predecessor.
    ///
    /// Idempotent: notifying the current predecessor changes nothing.
    pub fn notify(&mut self, node: Node) -> bool {
        if !self.accept(&node, &node.id) {
            return false;
        }

        if self.locations.upsert(node, node.id) {
            self.events.push(RingEvent::Joined(node));
        }

        self.adopt_predecessor(&node.id)
    }

    /// Out of band hint that `node`, reported by `source`, joined next to us.
    pub fn alert(&mut self, node: Node, source: Id) -> bool {
        let successor_changed = self.notice(node, source);

        let predecessor_changed =
            self.locations.contains(&node.id) && self.adopt_predecessor(&node.id);

        successor_changed || predecessor_changed
    }

    /// Record the answer of refreshing successor wedge `index`.
    pub fn fix_finger(&mut self, index: usize, successor: Node) -> bool {
        if successor.id != self.me.id {
            self.notice(successor, successor.id);
        }

        if successor.id == self.me.id || !self.locations.is_alive(&successor.id) {
            self.fingers.clear_successor_wedge(index);
            return false;
        }

        self.fingers.fix_successor_wedge(index, &successor.id)
    }

    /// Suspect `id` without forgetting it, replacing it in every wedge.
    pub fn mark_dead(&mut self, id: &Id) {
        self.locations.mark_dead(id);
        self.fingers.repair(id, &self.locations);
    }

    /// Forget `id`, and refuse to relearn it second hand for a while.
    pub fn evict(&mut self, id: &Id, now: Instant) -> bool {
        if *id == self.me.id {
            return false;
        }

        self.mark_dead(id);

        let evicted = self.locations.evict(id, now).is_some();
        if evicted {
            debug!(context = "ring", me = ?self.me.id, evicted = ?id, "Evicted location");
            self.events.push(RingEvent::Left(*id));
        }

        evicted
    }

    /// Purge dead locations and shrink the cache down to `capacity`.
    ///
    /// Returns the identifiers that were dropped.
    pub fn housekeeping(&mut self, now: Instant, retention: Duration, capacity: usize) -> Vec<Id> {
        let mut removed = self.locations.purge_dead(now, retention);

        for id in &removed {
            self.fingers.repair(id, &self.locations);
            self.events.push(RingEvent::Left(*id));
        }

        let pinned = self.pinned();
        removed.extend(self.locations.enforce_capacity(capacity, &pinned));

        if !removed.is_empty() {
            trace!(context = "ring", removed = removed.len(), "Housekeeping");
        }

        removed
    }

    // === Private Methods ===

    fn accept(&self, node: &Node, source: &Id) -> bool {
        if node.id == self.me.id || !self.space.contains(&node.id) {
            return false;
        }

        !self.locations.is_tombstoned(&node.id) || *source == node.id
    }

    fn adopt_predecessor(&mut self, id: &Id) -> bool {
        let accepted = match self.fingers.predecessor() {
            None => true,
            Some(current) => between(&current, &self.me.id, id),
        };

        accepted && self.locations.is_alive(id) && self.fingers.notice_possible_new_predecessor(id)
    }
}
