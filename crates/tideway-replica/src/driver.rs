//! Periodic driver for ship and GC ticks.
//!
//! A child task owning the two timers. Ticks are posted into the replica
//! inbox as ordinary messages, so they are serialized with everything
//! else the replica handles and can never preempt an in-flight handler.
//! The task exits once the replica's inbox is gone.

use crate::message::Incoming;
use std::time::Duration;
use tideway_core::lattice::Lattice;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

pub(crate) fn spawn<L: Lattice>(
    inbox: mpsc::UnboundedSender<Incoming<L>>,
    ship_interval: Duration,
    gc_interval: Duration,
) {
    tokio::spawn(async move {
        let start = Instant::now();
        let mut ship = time::interval_at(start + ship_interval, ship_interval);
        let mut gc = time::interval_at(start + gc_interval, gc_interval);
        ship.set_missed_tick_behavior(MissedTickBehavior::Delay);
        gc.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let tick = tokio::select! {
                _ = ship.tick() => Incoming::TryShip,
                _ = gc.tick() => Incoming::GcTick,
            };
            if inbox.send(tick).is_err() {
                break;
            }
        }
    });
}
