//! Delta buffer and acknowledgement tracking.
//!
//! The buffer maps a replica's own sequence numbers to `(origin, delta)`
//! pairs: every locally applied mutation and every accepted inbound
//! interval lands here under the next sequence number. Shipping folds a
//! sequence range into one interval, excluding deltas the destination
//! itself originated; GC prunes everything below the lowest neighbour
//! acknowledgement.

use crate::message::Endpoint;
use std::collections::{BTreeMap, HashMap, HashSet};
use tideway_core::lattice::Lattice;

/// Ordered log of not-yet-collected deltas, keyed by sequence number.
pub struct DeltaBuffer<L: Lattice> {
    entries: BTreeMap<u64, (Endpoint<L>, L)>,
}

impl<L: Lattice> DeltaBuffer<L> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Record a delta under `seq`, tagged with the endpoint it came from
    /// (ourselves for local operations).
    pub fn insert(&mut self, seq: u64, origin: Endpoint<L>, delta: L) {
        self.entries.insert(seq, (origin, delta));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn min_key(&self) -> Option<u64> {
        self.entries.keys().next().copied()
    }

    /// Join the deltas in `[lo, hi)` whose origin is not `exclude`.
    /// Returns `None` when no delta qualifies.
    pub fn interval(&self, lo: u64, hi: u64, exclude: &Endpoint<L>) -> Option<L> {
        let mut folded: Option<L> = None;
        for (_, (origin, delta)) in self.entries.range(lo..hi) {
            if origin == exclude {
                continue;
            }
            folded = Some(match folded {
                None => delta.clone(),
                Some(acc) => acc.join(delta),
            });
        }
        folded
    }

    /// Drop every delta below `floor`, returning how many were pruned.
    pub fn prune_below(&mut self, floor: u64) -> usize {
        let before = self.entries.len();
        self.entries = self.entries.split_off(&floor);
        before - self.entries.len()
    }
}

impl<L: Lattice> Default for DeltaBuffer<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Highest sequence number each neighbour has acknowledged receiving
/// from us. Updates are monotone; reordered acks never regress.
pub struct AckTracker<L: Lattice> {
    acked: HashMap<Endpoint<L>, u64>,
}

impl<L: Lattice> AckTracker<L> {
    pub fn new() -> Self {
        Self {
            acked: HashMap::new(),
        }
    }

    pub fn ack(&mut self, from: Endpoint<L>, seq: u64) {
        let entry = self.acked.entry(from).or_insert(0);
        *entry = (*entry).max(seq);
    }

    pub fn get(&self, neighbour: &Endpoint<L>) -> u64 {
        self.acked.get(neighbour).copied().unwrap_or(0)
    }

    /// Lowest acknowledgement among neighbours that have one recorded;
    /// 0 when none has acked yet. Deltas below this are safe to prune.
    pub fn floor(&self, neighbours: &HashSet<Endpoint<L>>) -> u64 {
        neighbours
            .iter()
            .filter_map(|n| self.acked.get(n).copied())
            .min()
            .unwrap_or(0)
    }
}

impl<L: Lattice> Default for AckTracker<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tideway_core::lattice::Lattice;
    use tideway_core::orset::{ORSet, ORSetOp};

    fn endpoint(id: u64) -> Endpoint<ORSet<i32>> {
        Endpoint::channel(&format!("e{id}"), id).0
    }

    fn delta(node: u64, value: i32) -> ORSet<i32> {
        ORSet::empty().mutate(ORSetOp::Add(value), node)
    }

    #[test]
    fn interval_folds_a_range() {
        let a = endpoint(1);
        let mut buf = DeltaBuffer::new();
        for i in 0..5 {
            // Distinct origin nodes so every delta carries its own dot.
            buf.insert(i, a.clone(), delta(100 + i, i as i32));
        }

        let other = endpoint(2);
        let folded = buf.interval(1, 4, &other).unwrap();
        let read = folded.read();
        assert!(!read.contains(&0));
        assert!(read.contains(&1));
        assert!(read.contains(&3));
        assert!(!read.contains(&4));
    }

    #[test]
    fn interval_excludes_the_destination_origin() {
        let ours = endpoint(1);
        let theirs = endpoint(2);
        let mut buf = DeltaBuffer::new();
        buf.insert(0, ours.clone(), delta(1, 10));
        buf.insert(1, theirs.clone(), delta(2, 20));

        let folded = buf.interval(0, 2, &theirs).unwrap();
        assert!(folded.read().contains(&10));
        assert!(!folded.read().contains(&20));

        // Nothing but their own deltas in range: no interval at all.
        assert!(buf.interval(1, 2, &theirs).is_none());
    }

    #[test]
    fn prune_below_keeps_the_floor() {
        let a = endpoint(1);
        let mut buf = DeltaBuffer::new();
        for i in 0..6 {
            buf.insert(i, a.clone(), delta(1, i as i32));
        }

        let pruned = buf.prune_below(4);
        assert_eq!(pruned, 4);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.min_key(), Some(4));
    }

    #[test]
    fn acks_are_monotone_under_reordering() {
        let n = endpoint(7);
        let mut acks = AckTracker::new();
        acks.ack(n.clone(), 5);
        acks.ack(n.clone(), 3);
        assert_eq!(acks.get(&n), 5);
        acks.ack(n.clone(), 9);
        assert_eq!(acks.get(&n), 9);
    }

    #[test]
    fn floor_ignores_neighbours_without_acks() {
        let a = endpoint(1);
        let b = endpoint(2);
        let mut neighbours = HashSet::new();
        neighbours.insert(a.clone());
        neighbours.insert(b.clone());

        let mut acks = AckTracker::new();
        assert_eq!(acks.floor(&neighbours), 0);

        acks.ack(a.clone(), 12);
        // b has never acked: it does not hold the floor down.
        assert_eq!(acks.floor(&neighbours), 12);

        acks.ack(b.clone(), 4);
        assert_eq!(acks.floor(&neighbours), 4);
    }
}
