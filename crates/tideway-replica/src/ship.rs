//! Per-neighbour shipping policy.
//!
//! For each neighbour the replica ships either the joined delta interval
//! covering what the neighbour has not yet acknowledged, or, when the
//! buffer no longer holds those deltas, the full current state, which
//! any receiver can always admit. Deltas the neighbour itself handed us
//! are never echoed back.

use crate::buffer::DeltaBuffer;
use crate::message::Endpoint;
use tideway_core::lattice::Lattice;

/// Outcome of planning a shipment for one neighbour.
pub enum Shipment<L> {
    /// The buffer has been collected past what the neighbour needs (or is
    /// empty): only the full state can bring it up to date.
    State(L),
    /// Joined deltas in `[remote_acked, sequence_number)`, minus the
    /// neighbour's own.
    Interval(L),
    /// Nothing the neighbour is missing.
    Skip,
}

/// Decide what, if anything, to ship to `neighbour`.
///
/// The quoted sequence number accompanying either payload is always the
/// local one; it is what the neighbour's ack will carry back.
pub fn plan_shipment<L: Lattice>(
    buffer: &DeltaBuffer<L>,
    remote_acked: u64,
    sequence_number: u64,
    state: &L,
    neighbour: &Endpoint<L>,
) -> Shipment<L> {
    match buffer.min_key() {
        None => Shipment::State(state.clone()),
        Some(min) if min > remote_acked => Shipment::State(state.clone()),
        Some(_) => match buffer.interval(remote_acked, sequence_number, neighbour) {
            Some(interval) if remote_acked < sequence_number => Shipment::Interval(interval),
            _ => Shipment::Skip,
        },
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
    fn empty_buffer_ships_full_state() {
        let buf: DeltaBuffer<ORSet<i32>> = DeltaBuffer::new();
        let state = delta(1, 7);
        let n = endpoint(2);
        match plan_shipment(&buf, 0, 3, &state, &n) {
            Shipment::State(s) => assert!(s.read().contains(&7)),
            _ => panic!("expected full-state shipment"),
        }
    }

    #[test]
    fn collected_buffer_ships_full_state() {
        let me = endpoint(1);
        let n = endpoint(2);
        let mut buf = DeltaBuffer::new();
        buf.insert(5, me.clone(), delta(1, 5));

        // Neighbour acked nothing; our oldest delta is 5: it needs 0..5
        // which we no longer hold.
        match plan_shipment(&buf, 0, 6, &delta(1, 0), &n) {
            Shipment::State(_) => {}
            _ => panic!("expected full-state shipment"),
        }
    }

    #[test]
    fn behind_neighbour_gets_the_interval() {
        let me = endpoint(1);
        let n = endpoint(2);
        let mut buf = DeltaBuffer::new();
        for i in 0..4 {
            // Distinct origin nodes so every delta carries its own dot.
            buf.insert(i, me.clone(), delta(100 + i, i as i32));
        }

        match plan_shipment(&buf, 2, 4, &delta(1, 99), &n) {
            Shipment::Interval(d) => {
                assert!(!d.read().contains(&1));
                assert!(d.read().contains(&2));
                assert!(d.read().contains(&3));
            }
            _ => panic!("expected interval shipment"),
        }
    }

    #[test]
    fn own_deltas_are_never_echoed() {
        let me = endpoint(1);
        let n = endpoint(2);
        let mut buf = DeltaBuffer::new();
        buf.insert(0, me.clone(), delta(1, 10));
        buf.insert(1, n.clone(), delta(2, 20));

        match plan_shipment(&buf, 0, 2, &delta(1, 99), &n) {
            Shipment::Interval(d) => {
                assert!(d.read().contains(&10));
                assert!(!d.read().contains(&20));
            }
            _ => panic!("expected interval shipment"),
        }

        // Only their own deltas pending: nothing to send at all.
        match plan_shipment(&buf, 1, 2, &delta(1, 99), &n) {
            Shipment::Skip => {}
            _ => panic!("expected skip"),
        }
    }

    #[test]
    fn caught_up_neighbour_is_skipped() {
        let me = endpoint(1);
        let n = endpoint(2);
        let mut buf = DeltaBuffer::new();
        buf.insert(0, me.clone(), delta(1, 10));

        match plan_shipment(&buf, 1, 1, &delta(1, 99), &n) {
            Shipment::Skip => {}
            _ => panic!("expected skip"),
        }
    }
}
