//! Dots and causal contexts.
//!
//! Every mutation event is identified by a **dot** `(node, counter)`. A
//! causal context is the set of dots a state has observed, stored in
//! compressed form:
//!
//! - a clock mapping each node to the end of its **contiguous prefix**
//!   (`clock[n] = m` means dots `(n, 1)..=(n, m)` have all been seen), and
//! - a **cloud** of detached dots beyond the prefix.
//!
//! The prefix boundary per node is the context's *maxima*; the replication
//! layer uses it to reject delta intervals that would skip a dot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identity of a replica within causal contexts.
pub type NodeId = u64;

/// A unique identifier for a single mutation event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot {
    pub node: NodeId,
    pub counter: u64,
}

impl Dot {
    pub fn new(node: NodeId, counter: u64) -> Self {
        Self { node, counter }
    }
}

/// Compressed set of observed dots: contiguous per-node prefixes plus a
/// cloud of detached dots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalContext {
    clock: BTreeMap<NodeId, u64>,
    cloud: BTreeSet<Dot>,
}

impl CausalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clock.is_empty() && self.cloud.is_empty()
    }

    /// Whether the context has observed `dot`.
    pub fn contains(&self, dot: &Dot) -> bool {
        self.clock
            .get(&dot.node)
            .is_some_and(|&m| dot.counter <= m)
            || self.cloud.contains(dot)
    }

    /// Per-node largest contiguous dot. A node appears only once its dot 1
    /// has been observed; detached cloud dots do not extend the prefix.
    pub fn maxima(&self) -> &BTreeMap<NodeId, u64> {
        &self.clock
    }

    /// Smallest observed dot per node, across prefix and cloud.
    pub fn first_dots(&self) -> BTreeMap<NodeId, u64> {
        let mut first: BTreeMap<NodeId, u64> = BTreeMap::new();
        for &node in self.clock.keys() {
            first.insert(node, 1);
        }
        for dot in &self.cloud {
            first
                .entry(dot.node)
                .and_modify(|f| *f = (*f).min(dot.counter))
                .or_insert(dot.counter);
        }
        first
    }

    /// Next unused dot for `node`. Mutators call this against the current
    /// state context; a replica's own dots are always contiguous, so this
    /// is the prefix end plus one unless detached dots exist.
    pub fn next_dot(&self, node: NodeId) -> Dot {
        let prefix = self.clock.get(&node).copied().unwrap_or(0);
        let detached = self
            .cloud
            .iter()
            .filter(|d| d.node == node)
            .map(|d| d.counter)
            .max()
            .unwrap_or(0);
        Dot::new(node, prefix.max(detached) + 1)
    }

    /// Observe a single dot, extending the prefix when contiguous.
    pub fn insert(&mut self, dot: Dot) {
        let prefix = self.clock.get(&dot.node).copied().unwrap_or(0);
        if dot.counter <= prefix {
            return;
        }
        if dot.counter == prefix + 1 {
            self.clock.insert(dot.node, dot.counter);
            self.absorb(dot.node);
        } else {
            self.cloud.insert(dot);
        }
    }

    /// Union with another context. Prefixes merge by per-node max, clouds
    /// by set union, then the result is compacted.
    pub fn union(&mut self, other: &Self) {
        for (&node, &m) in &other.clock {
            let cur = self.clock.get(&node).copied().unwrap_or(0);
            if m > cur {
                self.clock.insert(node, m);
            }
        }
        for &dot in &other.cloud {
            self.cloud.insert(dot);
        }
        self.compact();
    }

    /// Fold cloud dots that have become contiguous into the clock and drop
    /// cloud dots the prefix already dominates.
    pub fn compact(&mut self) {
        let nodes: BTreeSet<NodeId> = self.cloud.iter().map(|d| d.node).collect();
        for node in nodes {
            let before = self.clock.get(&node).copied().unwrap_or(0);
            let mut m = before;
            while self.cloud.remove(&Dot::new(node, m + 1)) {
                m += 1;
            }
            if m > before {
                self.clock.insert(node, m);
            }
            self.cloud.retain(|d| d.node != node || d.counter > m);
        }
    }

    fn absorb(&mut self, node: NodeId) {
        let mut m = self.clock.get(&node).copied().unwrap_or(0);
        while self.cloud.remove(&Dot::new(node, m + 1)) {
            m += 1;
        }
        self.clock.insert(node, m);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_inserts_extend_the_prefix() {
        let mut ctx = CausalContext::new();
        ctx.insert(Dot::new(1, 1));
        ctx.insert(Dot::new(1, 2));
        assert_eq!(ctx.maxima().get(&1), Some(&2));
        assert!(ctx.contains(&Dot::new(1, 1)));
        assert!(!ctx.contains(&Dot::new(1, 3)));
    }

    #[test]
    fn detached_dots_go_to_the_cloud() {
        let mut ctx = CausalContext::new();
        ctx.insert(Dot::new(7, 3));
        // No contiguous prefix yet: maxima is undefined for node 7.
        assert_eq!(ctx.maxima().get(&7), None);
        assert!(ctx.contains(&Dot::new(7, 3)));
        assert!(!ctx.contains(&Dot::new(7, 1)));
    }

    #[test]
    fn compaction_folds_the_cloud_into_the_clock() {
        let mut ctx = CausalContext::new();
        ctx.insert(Dot::new(1, 3));
        ctx.insert(Dot::new(1, 2));
        assert_eq!(ctx.maxima().get(&1), None);

        ctx.insert(Dot::new(1, 1));
        assert_eq!(ctx.maxima().get(&1), Some(&3));
        assert!(ctx.first_dots().get(&1) == Some(&1));
    }

    #[test]
    fn union_takes_per_node_max_and_merges_clouds() {
        let mut a = CausalContext::new();
        a.insert(Dot::new(1, 1));
        a.insert(Dot::new(1, 2));

        let mut b = CausalContext::new();
        b.insert(Dot::new(1, 1));
        b.insert(Dot::new(2, 4));

        a.union(&b);
        assert_eq!(a.maxima().get(&1), Some(&2));
        assert_eq!(a.maxima().get(&2), None);
        assert!(a.contains(&Dot::new(2, 4)));
        assert_eq!(a.first_dots().get(&2), Some(&4));
    }

    #[test]
    fn next_dot_skips_detached_dots() {
        let mut ctx = CausalContext::new();
        ctx.insert(Dot::new(5, 1));
        ctx.insert(Dot::new(5, 4));
        assert_eq!(ctx.next_dot(5), Dot::new(5, 5));
        assert_eq!(ctx.next_dot(6), Dot::new(6, 1));
    }

    #[test]
    fn first_dots_prefers_the_prefix_start() {
        let mut ctx = CausalContext::new();
        ctx.insert(Dot::new(1, 1));
        ctx.insert(Dot::new(1, 5));
        let first = ctx.first_dots();
        assert_eq!(first.get(&1), Some(&1));
    }
}
