//! Observed-Remove Set (add-wins).
//!
//! Each add tags the element with a fresh dot; remove covers the observed
//! dots through the causal context without adding any. Concurrent add and
//! remove of the same element: the add's dot is unseen by the remover, so
//! it survives the join and the add wins.

use crate::causal::{CausalContext, Dot, NodeId};
use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ORSet<T: Ord + Clone> {
    /// Live dots per element.
    entries: BTreeMap<T, BTreeSet<Dot>>,
    context: CausalContext,
}

/// Mutations of an [`ORSet`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ORSetOp<T> {
    Add(T),
    Remove(T),
}

impl<T: Ord + Clone> ORSet<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            context: CausalContext::new(),
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.entries
            .get(value)
            .is_some_and(|dots| !dots.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn observed_dots(&self, value: &T) -> BTreeSet<Dot> {
        self.entries.get(value).cloned().unwrap_or_default()
    }
}

impl<T: Ord + Clone> Default for ORSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone + Send + 'static> Lattice for ORSet<T> {
    type Value = BTreeSet<T>;
    type Mutator = ORSetOp<T>;

    fn empty() -> Self {
        Self::new()
    }

    fn read(&self) -> Self::Value {
        self.entries
            .iter()
            .filter(|(_, dots)| !dots.is_empty())
            .map(|(value, _)| value.clone())
            .collect()
    }

    fn mutate(&self, mutator: Self::Mutator, node: NodeId) -> Self {
        let mut delta = Self::new();
        match mutator {
            ORSetOp::Add(value) => {
                let dot = self.context.next_dot(node);
                let observed = self.observed_dots(&value);
                delta
                    .entries
                    .insert(value, BTreeSet::from([dot]));
                delta.context.insert(dot);
                for d in observed {
                    delta.context.insert(d);
                }
            }
            ORSetOp::Remove(value) => {
                // The delta carries only the covered dots; joining it drops
                // every observed instance of the element.
                for d in self.observed_dots(&value) {
                    delta.context.insert(d);
                }
            }
        }
        delta
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = Self::new();

        let keys: BTreeSet<&T> = self.entries.keys().chain(other.entries.keys()).collect();
        for key in keys {
            let ours = self.entries.get(key);
            let theirs = other.entries.get(key);
            let mut dots = BTreeSet::new();

            // A dot survives when both sides hold it, or when one side
            // holds it and the other has not yet observed it.
            if let Some(ours) = ours {
                for dot in ours {
                    let kept = theirs.is_some_and(|t| t.contains(dot))
                        || !other.context.contains(dot);
                    if kept {
                        dots.insert(*dot);
                    }
                }
            }
            if let Some(theirs) = theirs {
                for dot in theirs {
                    if !self.context.contains(dot) {
                        dots.insert(*dot);
                    }
                }
            }

            if !dots.is_empty() {
                result.entries.insert((*key).clone(), dots);
            }
        }

        result.context = self.context.clone();
        result.context.union(&other.context);
        result
    }

    fn compress(mut self) -> Self {
        self.context.compact();
        self.entries.retain(|_, dots| !dots.is_empty());
        self
    }

    fn causal_context(&self) -> &CausalContext {
        &self.context
    }
}
