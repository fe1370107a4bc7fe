//! Per-worker bookkeeping: price floor, held requests, unpaid results and
//! the completed work that still bonds the worker's stake.

use std::collections::{BTreeSet, HashMap};

use warden_core::{AccountId, Amount, Height, RequestId};

#[derive(Debug, Clone, Default)]
struct WorkerState {
    min_price: Amount,
    assigned: BTreeSet<RequestId>,
    pending_payouts: BTreeSet<RequestId>,
    /// Completed requests still open to police reports, keyed by the last
    /// height a report is accepted. Paid or not, these keep the stake at risk.
    bonds: BTreeSet<(Height, RequestId)>,
}

impl WorkerState {
    fn drop_closed_bonds(&mut self, height: Height) {
        while let Some(&(window_ends_at, _)) = self.bonds.first() {
            if window_ends_at >= height {
                break;
            }
            self.bonds.pop_first();
        }
    }
}

/// Worker state keyed by identity. Unknown workers read as defaults.
#[derive(Debug, Clone, Default)]
pub struct WorkerBook {
    workers: HashMap<AccountId, WorkerState>,
}

impl WorkerBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The lowest price `worker` accepts. Zero until set.
    #[must_use]
    pub fn min_price(&self, worker: &AccountId) -> Amount {
        self.workers.get(worker).map(|w| w.min_price).unwrap_or_default()
    }

    /// Change the lowest price `worker` accepts.
    pub fn set_min_price(&mut self, worker: &AccountId, price: Amount) {
        self.entry(worker).min_price = price;
    }

    /// Number of requests `worker` currently holds.
    #[must_use]
    pub fn assigned_count(&self, worker: &AccountId) -> usize {
        self.workers.get(worker).map_or(0, |w| w.assigned.len())
    }

    /// Record that `worker` now holds `id`.
    pub fn record_assignment(&mut self, worker: &AccountId, id: RequestId) {
        self.entry(worker).assigned.insert(id);
    }

    /// Record that `worker` no longer holds `id`. Returns `true` if it did.
    pub fn release_assignment(&mut self, worker: &AccountId, id: RequestId) -> bool {
        self.workers.get_mut(worker).is_some_and(|w| w.assigned.remove(&id))
    }

    /// Queue `id` for a future reward claim by `worker`.
    pub fn add_pending_payout(&mut self, worker: &AccountId, id: RequestId) {
        self.entry(worker).pending_payouts.insert(id);
    }

    /// Drop `id` from `worker`'s unpaid results. Returns `true` if it was there.
    pub fn remove_pending_payout(&mut self, worker: &AccountId, id: RequestId) -> bool {
        self.workers.get_mut(worker).is_some_and(|w| w.pending_payouts.remove(&id))
    }

    /// Unpaid completed requests of `worker`, oldest first.
    #[must_use]
    pub fn pending_payouts(&self, worker: &AccountId) -> Vec<RequestId> {
        self.workers
            .get(worker)
            .map(|w| w.pending_payouts.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Bond `worker`'s stake to `id` until its police window closes at
    /// `window_ends_at`. Bonds already closed at `height` are dropped.
    pub fn bond(&mut self, worker: &AccountId, id: RequestId, window_ends_at: Height, height: Height) {
        let state = self.entry(worker);
        state.drop_closed_bonds(height);
        state.bonds.insert((window_ends_at, id));
    }

    /// Release the bond on `id` early. Returns `true` if it was held.
    pub fn release_bond(&mut self, worker: &AccountId, id: RequestId, window_ends_at: Height) -> bool {
        self.workers.get_mut(worker).is_some_and(|w| w.bonds.remove(&(window_ends_at, id)))
    }

    /// Requests that lock `worker`'s stake at `height`: those it holds plus
    /// completed ones a police report could still turn invalid.
    pub fn outstanding(&mut self, worker: &AccountId, height: Height) -> usize {
        self.workers.get_mut(worker).map_or(0, |w| {
            w.drop_closed_bonds(height);
            w.assigned.len() + w.bonds.len()
        })
    }

    fn entry(&mut self, worker: &AccountId) -> &mut WorkerState {
        self.workers.entry(worker.clone()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> AccountId {
        AccountId::new("auditor")
    }

    #[test]
    fn unknown_worker_reads_as_default() {
        let book = WorkerBook::new();
        assert_eq!(book.min_price(&worker()), Amount::ZERO);
        assert_eq!(book.assigned_count(&worker()), 0);
        assert!(book.pending_payouts(&worker()).is_empty());
    }

    #[test]
    fn assignment_count_tracks_record_and_release() {
        let mut book = WorkerBook::new();
        book.record_assignment(&worker(), RequestId::new(1));
        book.record_assignment(&worker(), RequestId::new(2));
        assert_eq!(book.assigned_count(&worker()), 2);
        assert!(book.release_assignment(&worker(), RequestId::new(1)));
        assert!(!book.release_assignment(&worker(), RequestId::new(1)));
        assert_eq!(book.assigned_count(&worker()), 1);
    }

    #[test]
    fn pending_payouts_are_ordered_by_id() {
        let mut book = WorkerBook::new();
        book.add_pending_payout(&worker(), RequestId::new(7));
        book.add_pending_payout(&worker(), RequestId::new(3));
        assert_eq!(book.pending_payouts(&worker()), [RequestId::new(3), RequestId::new(7)]);
        assert!(book.remove_pending_payout(&worker(), RequestId::new(3)));
        assert!(!book.remove_pending_payout(&worker(), RequestId::new(3)));
        assert_eq!(book.pending_payouts(&worker()), [RequestId::new(7)]);
    }

    #[test]
    fn bonds_lock_until_their_window_closes() {
        let mut book = WorkerBook::new();
        book.record_assignment(&worker(), RequestId::new(1));
        book.bond(&worker(), RequestId::new(2), 15, 0);
        book.bond(&worker(), RequestId::new(3), 20, 5);
        assert_eq!(book.outstanding(&worker(), 15), 3);
        assert_eq!(book.outstanding(&worker(), 16), 2);
        assert!(book.release_assignment(&worker(), RequestId::new(1)));
        assert_eq!(book.outstanding(&worker(), 20), 1);
        assert_eq!(book.outstanding(&worker(), 21), 0);
    }

    #[test]
    fn released_bond_stops_locking() {
        let mut book = WorkerBook::new();
        book.bond(&worker(), RequestId::new(2), 15, 0);
        assert!(book.release_bond(&worker(), RequestId::new(2), 15));
        assert!(!book.release_bond(&worker(), RequestId::new(2), 15));
        assert_eq!(book.outstanding(&worker(), 0), 0);
    }

    #[test]
    fn set_min_price_persists() {
        let mut book = WorkerBook::new();
        book.set_min_price(&worker(), Amount::new(123));
        assert_eq!(book.min_price(&worker()), Amount::new(123));
    }
}
