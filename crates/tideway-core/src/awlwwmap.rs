//! Add-Wins Last-Writer-Wins Map.
//!
//! Keys behave like an observed-remove set (concurrent put beats remove);
//! concurrent values for the same key resolve by largest write timestamp,
//! with the dot as a deterministic total tiebreak. The dot store is keyed
//! by dot, so joining is a plain causal merge of disjoint entries.

use crate::causal::{CausalContext, Dot, NodeId};
use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// One write: the key it targets, its wall-clock timestamp and the value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapWrite<K, V> {
    pub key: K,
    pub timestamp: u64,
    pub value: V,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AWLWWMap<K: Ord + Clone, V: Clone + PartialEq> {
    entries: BTreeMap<Dot, MapWrite<K, V>>,
    context: CausalContext,
}

/// Mutations of an [`AWLWWMap`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AWLWWMapOp<K, V> {
    Put(K, V),
    Remove(K),
}

fn wall_clock_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

impl<K: Ord + Clone, V: Clone + PartialEq> AWLWWMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            context: CausalContext::new(),
        }
    }

    /// Resolve the current value for `key`, if any live write targets it.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .iter()
            .filter(|(_, w)| &w.key == key)
            .max_by_key(|(dot, w)| (w.timestamp, **dot))
            .map(|(_, w)| &w.value)
    }

    pub fn len(&self) -> usize {
        self.entries
            .values()
            .map(|w| &w.key)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn observed_dots(&self, key: &K) -> Vec<Dot> {
        self.entries
            .iter()
            .filter(|(_, w)| &w.key == key)
            .map(|(dot, _)| *dot)
            .collect()
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> Default for AWLWWMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Lattice for AWLWWMap<K, V>
where
    K: Ord + Clone + Send + 'static,
    V: Clone + PartialEq + Send + 'static,
{
    type Value = BTreeMap<K, V>;
    type Mutator = AWLWWMapOp<K, V>;

    fn empty() -> Self {
        Self::new()
    }

    fn read(&self) -> Self::Value {
        let mut winners: BTreeMap<K, (u64, Dot)> = BTreeMap::new();
        let mut out = BTreeMap::new();
        for (dot, write) in &self.entries {
            let stamp = (write.timestamp, *dot);
            let wins = winners
                .get(&write.key)
                .map_or(true, |best| stamp > *best);
            if wins {
                winners.insert(write.key.clone(), stamp);
                out.insert(write.key.clone(), write.value.clone());
            }
        }
        out
    }

    fn mutate(&self, mutator: Self::Mutator, node: NodeId) -> Self {
        let mut delta = Self::new();
        match mutator {
            AWLWWMapOp::Put(key, value) => {
                let dot = self.context.next_dot(node);
                let observed = self.observed_dots(&key);
                delta.entries.insert(
                    dot,
                    MapWrite {
                        key,
                        timestamp: wall_clock_micros(),
                        value,
                    },
                );
                delta.context.insert(dot);
                for d in observed {
                    delta.context.insert(d);
                }
            }
            AWLWWMapOp::Remove(key) => {
                for d in self.observed_dots(&key) {
                    delta.context.insert(d);
                }
            }
        }
        delta
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = Self::new();

        for (dot, write) in &self.entries {
            let kept = other.entries.contains_key(dot) || !other.context.contains(dot);
            if kept {
                result.entries.insert(*dot, write.clone());
            }
        }
        for (dot, write) in &other.entries {
            if !result.entries.contains_key(dot) && !self.context.contains(dot) {
                result.entries.insert(*dot, write.clone());
            }
        }

        result.context = self.context.clone();
        result.context.union(&other.context);
        result
    }

    fn compress(mut self) -> Self {
        self.context.compact();
        self
    }

    fn causal_context(&self) -> &CausalContext {
        &self.context
    }
}
