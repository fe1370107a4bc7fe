//! Verifier ("police") registry and round-robin assignment.
//!
//! The active set keeps insertion order. A cursor remembers the position of
//! the last verifier handed a request; each round starts just after it and
//! wraps. Removing a verifier at or before the cursor pulls the cursor back
//! one slot so the next round neither skips nor repeats a neighbour.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use warden_core::{AccountId, Height, PoliceAssignment, RequestId};

/// Active verifiers, the rotation cursor, and outstanding assignments.
#[derive(Debug, Clone)]
pub struct VerifierRotator {
    active: IndexSet<AccountId>,
    /// Position of the last verifier assigned. `None` before the first round
    /// or after the verifier at position 0 was removed while under the cursor.
    cursor: Option<usize>,
    nodes_per_report: usize,
    /// Per verifier, outstanding assignments in the order they were made.
    assignments: HashMap<AccountId, IndexMap<RequestId, PoliceAssignment>>,
}

impl VerifierRotator {
    /// Create an empty registry assigning `nodes_per_report` verifiers per request.
    #[must_use]
    pub fn new(nodes_per_report: usize) -> Self {
        Self {
            active: IndexSet::new(),
            cursor: None,
            nodes_per_report,
            assignments: HashMap::new(),
        }
    }

    /// Add a verifier at the end of the rotation. Returns `false` if already active.
    pub fn add_verifier(&mut self, verifier: AccountId) -> bool {
        self.active.insert(verifier)
    }

    /// Remove a verifier and discard its outstanding assignments.
    ///
    /// Returns `false` if it was not active.
    pub fn remove_verifier(&mut self, verifier: &AccountId) -> bool {
        let Some((removed, _)) = self.active.shift_remove_full(verifier) else {
            return false;
        };
        self.cursor = match self.cursor {
            _ if self.active.is_empty() => None,
            Some(cursor) if removed <= cursor => cursor.checked_sub(1),
            other => other,
        };
        self.assignments.remove(verifier);
        true
    }

    /// Change how many verifiers each request receives.
    pub fn set_nodes_per_report(&mut self, nodes_per_report: usize) {
        self.nodes_per_report = nodes_per_report;
    }

    /// Verifiers assigned per request.
    #[must_use]
    pub fn nodes_per_report(&self) -> usize {
        self.nodes_per_report
    }

    /// Whether `verifier` is in the active set.
    #[must_use]
    pub fn is_active(&self, verifier: &AccountId) -> bool {
        self.active.contains(verifier)
    }

    /// Number of active verifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no verifier is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Assign the next `min(nodes_per_report, active)` verifiers to `request_id`.
    ///
    /// Returns the chosen verifiers in rotation order; empty when no verifier
    /// is active, in which case the request goes unpoliced. Each chosen
    /// verifier's assignments that expired before `height` are dropped.
    pub fn assign(
        &mut self,
        request_id: RequestId,
        height: Height,
        window_ends_at: Height,
    ) -> Vec<AccountId> {
        let count = self.active.len();
        if count == 0 {
            return Vec::new();
        }
        let take = self.nodes_per_report.min(count);
        let start = self.cursor.map_or(0, |cursor| (cursor + 1) % count);
        let mut chosen = Vec::with_capacity(take);
        for step in 0..take {
            let Some(verifier) = self.active.get_index((start + step) % count) else {
                continue;
            };
            let pending = self.assignments.entry(verifier.clone()).or_default();
            pending.retain(|_, assignment| !assignment.is_expired(height));
            pending.insert(
                request_id,
                PoliceAssignment::new(request_id, verifier.clone(), height, window_ends_at),
            );
            chosen.push(verifier.clone());
        }
        self.cursor = Some((start + take - 1) % count);
        chosen
    }

    /// Whether `verifier` holds a live assignment for `request_id` at `height`.
    #[must_use]
    pub fn is_assigned(&self, request_id: RequestId, verifier: &AccountId, height: Height) -> bool {
        self.assignments
            .get(verifier)
            .and_then(|pending| pending.get(&request_id))
            .is_some_and(|assignment| !assignment.is_expired(height))
    }

    /// Remove and return `verifier`'s assignment for `request_id`, expired or not.
    pub fn take(&mut self, request_id: RequestId, verifier: &AccountId) -> Option<PoliceAssignment> {
        self.assignments.get_mut(verifier)?.shift_remove(&request_id)
    }

    /// `verifier`'s assignment for `request_id` with its position in the
    /// verifier's queue, expired or not.
    #[must_use]
    pub fn slot(&self, request_id: RequestId, verifier: &AccountId) -> Option<(usize, PoliceAssignment)> {
        let (index, _, assignment) = self.assignments.get(verifier)?.get_full(&request_id)?;
        Some((index, assignment.clone()))
    }

    /// Put back an assignment removed by [`take`](Self::take) at `index`.
    pub fn restore(&mut self, index: usize, assignment: PoliceAssignment) {
        let pending = self.assignments.entry(assignment.verifier.clone()).or_default();
        let index = index.min(pending.len());
        pending.shift_insert(index, assignment.request_id, assignment);
    }

    /// Drop `verifier`'s expired assignments and return its oldest live one.
    pub fn next_assignment(&mut self, verifier: &AccountId, height: Height) -> Option<RequestId> {
        let pending = self.assignments.get_mut(verifier)?;
        pending.retain(|_, assignment| !assignment.is_expired(height));
        pending.first().map(|(request_id, _)| *request_id)
    }

    /// Number of outstanding assignments held by `verifier`, expired included.
    #[must_use]
    pub fn outstanding(&self, verifier: &AccountId) -> usize {
        self.assignments.get(verifier).map_or(0, IndexMap::len)
    }
}
