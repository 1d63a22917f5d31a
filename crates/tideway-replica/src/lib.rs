//! Anti-entropy engine for delta-state CRDT replicas.
//!
//! Each replica is a single-threaded actor owning a lattice-valued state
//! and a monotonically numbered delta log. Local mutations produce deltas
//! that are buffered and periodically shipped to neighbours as joined
//! **delta intervals**; neighbours acknowledge what they have received,
//! and deltas acknowledged by every neighbour are garbage-collected. A
//! neighbour that has fallen behind the buffer receives a full-state
//! shipment instead, which is always admissible.
//!
//! This realizes Algorithm 2 of Almeida et al., "Delta State Replicated
//! Data Types" (2016), with causal-prefix admissibility checks on
//! inbound intervals.

pub mod admission;
pub mod buffer;
pub mod config;
pub mod driver;
pub mod error;
pub mod message;
pub mod replica;
pub mod ship;

pub use config::{ReplicaConfig, ReplicaConfigBuilder, SHIP_AFTER_X_DELTAS};
pub use error::ReplicaError;
pub use message::{Endpoint, Incoming, Notify, ReplicaStats};
pub use replica::{Apply, Replica, ReplicaHandle};
