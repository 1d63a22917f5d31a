//! Join-semilattice capability consumed by the replication engine.
//!
//! A join-semilattice (S, ⊔) satisfies:
//! - Commutativity: a ⊔ b = b ⊔ a
//! - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//! - Idempotence:  a ⊔ a = a
//!
//! These properties guarantee convergence regardless of message order. A
//! delta produced by [`Lattice::mutate`] is a value of the same lattice;
//! the full mutation is recovered as `state ⊔ delta`, and the join of any
//! contiguous run of deltas is a valid delta interval.

use crate::causal::{CausalContext, NodeId};

/// A delta-state CRDT usable by the replication engine.
///
/// States and deltas share one type: a delta interval shipped over the
/// wire is indistinguishable from a full state, and both are joined the
/// same way on receipt.
pub trait Lattice: Clone + PartialEq + Send + 'static {
    /// User-visible projection of the state.
    type Value: Send;

    /// The named mutations this lattice supports.
    type Mutator: Send;

    /// The bottom element (identity for join).
    fn empty() -> Self;

    /// Project the state for a reader.
    fn read(&self) -> Self::Value;

    /// Compute the delta for a mutation originated at `node`. The state
    /// itself is not modified; callers join the delta in.
    fn mutate(&self, mutator: Self::Mutator, node: NodeId) -> Self;

    /// Least upper bound. Must be commutative, associative and idempotent.
    fn join(&self, other: &Self) -> Self;

    /// Normalize, dropping representation the causal context already
    /// dominates. Must commute with join.
    fn compress(self) -> Self;

    /// The set of dots this state has observed.
    fn causal_context(&self) -> &CausalContext;

    /// Join-assign: `self = self ⊔ other`.
    fn join_assign(&mut self, other: &Self) {
        *self = self.join(other);
    }
}
