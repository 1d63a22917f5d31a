//! Admissibility of inbound delta intervals.
//!
//! A delta interval may only be joined if it does not skip dots: for
//! every node it mentions, its smallest claimed dot must start at or
//! before the end of our contiguous prefix plus one. Joining a gapped
//! interval would break the per-node causal-prefix property that
//! context compression relies on.
//!
//! A full-state shipment always passes: its context carries complete
//! prefixes from dot 1.

use tideway_core::causal::CausalContext;

/// Whether an interval with context `interval` may be joined into a
/// state whose context is `local`.
///
/// Rejects iff some node `k` has a local maxima `m` and the interval's
/// first dot for `k` is beyond `m + 1`. Nodes we have no contiguous
/// prefix for are admitted unconditionally.
pub fn admissible(local: &CausalContext, interval: &CausalContext) -> bool {
    let last_known = local.maxima();
    interval.first_dots().iter().all(|(node, &first)| {
        match last_known.get(node) {
            Some(&max) => max + 1 >= first,
            None => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tideway_core::causal::{CausalContext, Dot};

    fn ctx(dots: &[(u64, u64)]) -> CausalContext {
        let mut ctx = CausalContext::new();
        for &(node, counter) in dots {
            ctx.insert(Dot::new(node, counter));
        }
        ctx
    }

    #[test]
    fn contiguous_extension_is_admissible() {
        let local = ctx(&[(1, 1), (1, 2)]);
        let interval = ctx(&[(1, 3), (1, 4)]);
        assert!(admissible(&local, &interval));
    }

    #[test]
    fn overlapping_replay_is_admissible() {
        let local = ctx(&[(1, 1), (1, 2)]);
        let interval = ctx(&[(1, 1), (1, 2)]);
        assert!(admissible(&local, &interval));
    }

    #[test]
    fn gapped_interval_is_rejected() {
        let local = ctx(&[(1, 1)]);
        // First dot for node 1 is 3: dot 2 would be skipped.
        let interval = ctx(&[(1, 3)]);
        assert!(!admissible(&local, &interval));
    }

    #[test]
    fn unknown_node_is_always_admissible() {
        let local = ctx(&[(1, 1)]);
        let interval = ctx(&[(9, 40)]);
        assert!(admissible(&local, &interval));
    }

    #[test]
    fn full_state_is_always_admissible() {
        let local = ctx(&[(1, 1)]);
        // A full state carries the complete prefix from dot 1.
        let interval = ctx(&[(1, 1), (1, 2), (1, 3), (2, 1)]);
        assert!(admissible(&local, &interval));
    }
}
