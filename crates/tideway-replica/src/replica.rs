//! The replica actor and its client handle.
//!
//! One replica per logical node. The actor owns the lattice state, the
//! delta log and the acknowledgement map, and processes exactly one
//! inbox message at a time to completion: there are no suspension
//! points inside a handler, and no shared mutable memory. Replicas talk
//! to each other only by asynchronous message passing through their
//! endpoints.
//!
//! Protocol sketch:
//!
//! 1. On local mutation: `Δ = mutate(X)`, `X = compress(X ⊔ Δ)`, log Δ
//!    under the next sequence number.
//! 2. On a ship trigger: for each neighbour, send either the joined
//!    delta interval it is missing or the full state if the log has been
//!    collected past its acknowledgement.
//! 3. On an inbound interval: admit only if it skips no dots, join it,
//!    log it under the origin, ack the quoted sequence number.
//! 4. On a GC tick: prune log entries every neighbour has acknowledged.

use crate::admission::admissible;
use crate::buffer::{AckTracker, DeltaBuffer};
use crate::config::{ReplicaConfig, SHIP_AFTER_X_DELTAS};
use crate::driver;
use crate::error::ReplicaError;
use crate::message::{Endpoint, Incoming, Notify, ReplicaStats};
use crate::ship::{plan_shipment, Shipment};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tideway_core::causal::NodeId;
use tideway_core::lattice::Lattice;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

/// Whether an operation call waits for the mutation to be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Apply {
    Sync,
    Async,
}

enum Flow {
    Continue,
    Stop(Option<oneshot::Sender<()>>),
}

/// The replica state machine. Constructed and driven by [`Replica::spawn`];
/// all interaction goes through the returned [`ReplicaHandle`].
pub struct Replica<L: Lattice> {
    name: Arc<str>,
    node_id: NodeId,
    endpoint: Endpoint<L>,
    state: L,
    sequence_number: u64,
    shipped_sequence_number: u64,
    deltas: DeltaBuffer<L>,
    neighbours: HashSet<Endpoint<L>>,
    acks: AckTracker<L>,
    ship_debounce: Duration,
    notify: Option<Notify>,
}

impl<L: Lattice> Replica<L> {
    /// Start a replica actor and its periodic driver.
    ///
    /// Fails only on missing configuration; everything past startup is
    /// best-effort.
    pub fn spawn(config: ReplicaConfig) -> Result<ReplicaHandle<L>, ReplicaError> {
        let name: Arc<str> = config
            .name
            .ok_or(ReplicaError::ConfigMissing("name"))?
            .into();

        let (tx, rx) = mpsc::unbounded_channel();
        let node_id = OsRng.next_u64();
        let endpoint = Endpoint::new(node_id, Arc::clone(&name), tx.clone());

        driver::spawn(
            tx,
            Duration::from_millis(config.ship_interval_ms),
            Duration::from_millis(config.gc_interval_ms),
        );

        let replica = Replica {
            name: Arc::clone(&name),
            node_id,
            endpoint: endpoint.clone(),
            state: L::empty(),
            sequence_number: 0,
            shipped_sequence_number: 0,
            deltas: DeltaBuffer::new(),
            neighbours: HashSet::new(),
            acks: AckTracker::new(),
            ship_debounce: Duration::from_millis(config.ship_debounce_ms),
            notify: config.notify,
        };

        info!(replica = %name, node_id, "replica started");
        tokio::spawn(replica.run(rx));

        Ok(ReplicaHandle { endpoint })
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Incoming<L>>) {
        let mut stopped = None;
        while let Some(msg) = rx.recv().await {
            match self.handle(msg) {
                Flow::Continue => {}
                Flow::Stop(done) => {
                    stopped = done;
                    break;
                }
            }
        }

        // Final best-effort ship so neighbours see everything we had.
        self.ship_to_all();
        info!(replica = %self.name, "replica stopped");
        if let Some(done) = stopped {
            let _ = done.send(());
        }
    }

    fn handle(&mut self, msg: Incoming<L>) -> Flow {
        match msg {
            Incoming::Operation { mutator, done } => {
                self.apply_local(mutator);
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Incoming::Read { reply } => {
                let _ = reply.send(self.state.read());
            }
            Incoming::ReadWith { read } => read(&self.state),
            Incoming::AddNeighbour { endpoint } => self.add_neighbour(endpoint),
            Incoming::AddNeighbours { endpoints } => {
                for endpoint in endpoints {
                    self.add_neighbour(endpoint);
                }
            }
            Incoming::Delta {
                origin,
                payload,
                seq,
            } => self.on_delta(origin, payload, seq),
            Incoming::Ack { from, seq } => {
                trace!(replica = %self.name, from = %from.name(), seq, "ack");
                self.acks.ack(from, seq);
            }
            Incoming::TryShip => self.on_try_ship(),
            Incoming::GcTick => self.garbage_collect(),
            Incoming::Ship { snapshot } => self.on_ship(snapshot),
            Incoming::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Incoming::Stop { done } => return Flow::Stop(done),
        }
        Flow::Continue
    }

    fn apply_local(&mut self, mutator: L::Mutator) {
        let delta = self.state.mutate(mutator, self.node_id);
        self.state = self.state.join(&delta).compress();
        self.deltas
            .insert(self.sequence_number, self.endpoint.clone(), delta);
        self.sequence_number += 1;
    }

    fn add_neighbour(&mut self, endpoint: Endpoint<L>) {
        // Never peer with ourselves.
        if endpoint.id() == self.endpoint.id() {
            return;
        }
        if self.neighbours.insert(endpoint) {
            debug!(replica = %self.name, neighbours = self.neighbours.len(), "neighbour added");
        }
    }

    fn on_delta(&mut self, origin: Endpoint<L>, payload: L, seq: u64) {
        if !admissible(self.state.causal_context(), payload.causal_context()) {
            debug!(
                replica = %self.name,
                from = %origin.name(),
                seq,
                "dropping causally premature delta interval"
            );
            return;
        }

        self.state = self.state.join(&payload).compress();
        self.deltas
            .insert(self.sequence_number, origin.clone(), payload);
        self.sequence_number += 1;
        origin.deliver_ack(self.endpoint.clone(), seq);
    }

    fn on_try_ship(&mut self) {
        if self.shipped_sequence_number == self.sequence_number {
            return;
        }

        // Snapshot now; ship once the burst has settled. Stale snapshots
        // are dropped on arrival, a fresher one always follows.
        let snapshot = self.sequence_number;
        let endpoint = self.endpoint.clone();
        let debounce = self.ship_debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            endpoint.send(Incoming::Ship { snapshot });
        });
    }

    fn on_ship(&mut self, snapshot: u64) {
        let forced = snapshot > self.shipped_sequence_number + SHIP_AFTER_X_DELTAS;
        let quiesced = snapshot == self.sequence_number;
        if !forced && !quiesced {
            trace!(replica = %self.name, snapshot, "stale ship snapshot dropped");
            return;
        }

        self.ship_to_all();
        self.shipped_sequence_number = snapshot;
        if let Some(notify) = &self.notify {
            notify.signal();
        }
    }

    fn ship_to_all(&self) {
        for neighbour in &self.neighbours {
            let remote_acked = self.acks.get(neighbour);
            let plan = plan_shipment(
                &self.deltas,
                remote_acked,
                self.sequence_number,
                &self.state,
                neighbour,
            );
            match plan {
                Shipment::State(state) => {
                    trace!(
                        replica = %self.name,
                        to = %neighbour.name(),
                        seq = self.sequence_number,
                        "shipping full state"
                    );
                    neighbour.deliver_delta(self.endpoint.clone(), state, self.sequence_number);
                }
                Shipment::Interval(interval) => {
                    trace!(
                        replica = %self.name,
                        to = %neighbour.name(),
                        from_seq = remote_acked,
                        seq = self.sequence_number,
                        "shipping delta interval"
                    );
                    neighbour.deliver_delta(self.endpoint.clone(), interval, self.sequence_number);
                }
                Shipment::Skip => {}
            }
        }
    }

    fn garbage_collect(&mut self) {
        if self.neighbours.is_empty() {
            return;
        }
        let floor = self.acks.floor(&self.neighbours);
        let pruned = self.deltas.prune_below(floor);
        if pruned > 0 {
            debug!(replica = %self.name, floor, pruned, "collected acknowledged deltas");
        }
    }

    fn stats(&self) -> ReplicaStats {
        ReplicaStats {
            sequence_number: self.sequence_number,
            shipped_sequence_number: self.shipped_sequence_number,
            buffered_deltas: self.deltas.len(),
            min_buffered_sequence: self.deltas.min_key(),
            neighbours: self.neighbours.len(),
        }
    }
}

/// Client handle to a running replica. Cheap to clone; all methods go
/// through the replica's inbox.
pub struct ReplicaHandle<L: Lattice> {
    endpoint: Endpoint<L>,
}

impl<L: Lattice> Clone for ReplicaHandle<L> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
        }
    }
}

impl<L: Lattice> ReplicaHandle<L> {
    /// The replica's own endpoint, for handing to other replicas as a
    /// neighbour.
    pub fn endpoint(&self) -> Endpoint<L> {
        self.endpoint.clone()
    }

    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    /// Read the user-visible value, waiting at most `timeout`.
    pub async fn read(&self, timeout: Duration) -> Result<L::Value, ReplicaError> {
        let (reply, rx) = oneshot::channel();
        if !self.endpoint.send(Incoming::Read { reply }) {
            return Err(ReplicaError::Stopped);
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ReplicaError::Stopped),
            Err(_) => Err(ReplicaError::ReadTimeout),
        }
    }

    /// Read through an arbitrary projection of the lattice state.
    pub async fn read_with<F, R>(&self, projection: F) -> Result<R, ReplicaError>
    where
        F: FnOnce(&L) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let read = Box::new(move |state: &L| {
            let _ = reply.send(projection(state));
        });
        if !self.endpoint.send(Incoming::ReadWith { read }) {
            return Err(ReplicaError::Stopped);
        }
        rx.await.map_err(|_| ReplicaError::Stopped)
    }

    /// Apply a locally-originated mutation. `Apply::Sync` waits until the
    /// replica has joined the delta; `Apply::Async` returns immediately.
    /// Neither waits for shipping.
    pub async fn operation(&self, mutator: L::Mutator, mode: Apply) -> Result<(), ReplicaError> {
        match mode {
            Apply::Async => {
                if self.endpoint.send(Incoming::Operation {
                    mutator,
                    done: None,
                }) {
                    Ok(())
                } else {
                    Err(ReplicaError::Stopped)
                }
            }
            Apply::Sync => {
                let (done, rx) = oneshot::channel();
                if !self.endpoint.send(Incoming::Operation {
                    mutator,
                    done: Some(done),
                }) {
                    return Err(ReplicaError::Stopped);
                }
                rx.await.map_err(|_| ReplicaError::Stopped)
            }
        }
    }

    /// Register a peer for anti-entropy. Idempotent, one-directional.
    pub fn add_neighbour(&self, endpoint: Endpoint<L>) -> Result<(), ReplicaError> {
        if self.endpoint.send(Incoming::AddNeighbour { endpoint }) {
            Ok(())
        } else {
            Err(ReplicaError::Stopped)
        }
    }

    /// Register several peers at once.
    pub fn add_neighbours(&self, endpoints: Vec<Endpoint<L>>) -> Result<(), ReplicaError> {
        if self.endpoint.send(Incoming::AddNeighbours { endpoints }) {
            Ok(())
        } else {
            Err(ReplicaError::Stopped)
        }
    }

    /// Snapshot of the replication counters.
    pub async fn stats(&self) -> Result<ReplicaStats, ReplicaError> {
        let (reply, rx) = oneshot::channel();
        if !self.endpoint.send(Incoming::Stats { reply }) {
            return Err(ReplicaError::Stopped);
        }
        rx.await.map_err(|_| ReplicaError::Stopped)
    }

    /// Stop the replica after a final best-effort ship to all neighbours.
    pub async fn stop(&self) -> Result<(), ReplicaError> {
        let (done, rx) = oneshot::channel();
        if !self.endpoint.send(Incoming::Stop { done: Some(done) }) {
            return Err(ReplicaError::Stopped);
        }
        rx.await.map_err(|_| ReplicaError::Stopped)
    }
}
