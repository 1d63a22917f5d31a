//! Endpoints and the replica inbox protocol.
//!
//! A replica is addressed through its [`Endpoint`]: a cheaply cloneable
//! handle that delivers messages into the replica's inbox. Everything the
//! replica reacts to (client operations, wire messages from peers,
//! timer ticks, the debounced ship trigger) arrives as one [`Incoming`]
//! value and is processed to completion before the next.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tideway_core::lattice::Lattice;
use tokio::sync::{mpsc, oneshot};

/// Everything a replica can receive.
pub enum Incoming<L: Lattice> {
    /// Locally-originated mutation.
    Operation {
        mutator: L::Mutator,
        done: Option<oneshot::Sender<()>>,
    },
    /// Read the user-visible projection of the state.
    Read { reply: oneshot::Sender<L::Value> },
    /// Read through an arbitrary projection; the closure replies through
    /// a channel it captured.
    ReadWith { read: Box<dyn FnOnce(&L) + Send> },
    AddNeighbour { endpoint: Endpoint<L> },
    AddNeighbours { endpoints: Vec<Endpoint<L>> },
    /// Wire message: a delta interval or full state from `origin`,
    /// quoting the origin's sequence number.
    Delta {
        origin: Endpoint<L>,
        payload: L,
        seq: u64,
    },
    /// Wire message: `from` has received everything up through `seq`.
    Ack { from: Endpoint<L>, seq: u64 },
    /// Periodic: consider scheduling a debounced ship.
    TryShip,
    /// Periodic: prune deltas every neighbour has acknowledged.
    GcTick,
    /// Debounced ship trigger carrying the sequence-number snapshot taken
    /// at tick time.
    Ship { snapshot: u64 },
    /// Introspection snapshot of the replication counters.
    Stats {
        reply: oneshot::Sender<ReplicaStats>,
    },
    /// Tear down after a final best-effort ship.
    Stop { done: Option<oneshot::Sender<()>> },
}

/// Address of a replica: identity plus a sender into its inbox.
///
/// Endpoints compare and hash by identity only, so they work as neighbour
/// set members and ack-map keys.
pub struct Endpoint<L: Lattice> {
    id: u64,
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Incoming<L>>,
}

impl<L: Lattice> Endpoint<L> {
    pub(crate) fn new(id: u64, name: Arc<str>, tx: mpsc::UnboundedSender<Incoming<L>>) -> Self {
        Self { id, name, tx }
    }

    /// A detached endpoint plus the receiving half of its inbox. This is
    /// the seam where a transport adapter (or a test probe) attaches: the
    /// adapter pumps received wire messages out of the channel.
    pub fn channel(name: &str, id: u64) -> (Self, mpsc::UnboundedReceiver<Incoming<L>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, Arc::from(name), tx), rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver a delta interval or full-state shipment to this endpoint.
    pub fn deliver_delta(&self, origin: Endpoint<L>, payload: L, seq: u64) -> bool {
        self.send(Incoming::Delta {
            origin,
            payload,
            seq,
        })
    }

    /// Deliver an acknowledgement to this endpoint.
    pub fn deliver_ack(&self, from: Endpoint<L>, seq: u64) -> bool {
        self.send(Incoming::Ack { from, seq })
    }

    pub(crate) fn send(&self, msg: Incoming<L>) -> bool {
        self.tx.send(msg).is_ok()
    }
}

impl<L: Lattice> Clone for Endpoint<L> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            tx: self.tx.clone(),
        }
    }
}

impl<L: Lattice> PartialEq for Endpoint<L> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<L: Lattice> Eq for Endpoint<L> {}

impl<L: Lattice> Hash for Endpoint<L> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<L: Lattice> fmt::Debug for Endpoint<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({}#{:016x})", self.name, self.id)
    }
}

/// Target signalled after each successful outbound ship. A vanished
/// receiver is ignored.
#[derive(Clone, Debug)]
pub struct Notify {
    target: mpsc::UnboundedSender<String>,
    message: String,
}

impl Notify {
    pub fn new(target: mpsc::UnboundedSender<String>, message: impl Into<String>) -> Self {
        Self {
            target,
            message: message.into(),
        }
    }

    pub(crate) fn signal(&self) {
        let _ = self.target.send(self.message.clone());
    }
}

/// Read-only snapshot of a replica's replication counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStats {
    pub sequence_number: u64,
    pub shipped_sequence_number: u64,
    pub buffered_deltas: usize,
    pub min_buffered_sequence: Option<u64>,
    pub neighbours: usize,
}
