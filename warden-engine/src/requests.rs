//! Audit request store.
//!
//! Owns every [`AuditRequest`] ever submitted together with the
//! [`RequestQueue`] of those still waiting for a worker.

use std::collections::BTreeMap;

use warden_core::{AccountId, Amount, AuditRequest, Height, RequestId, RequestState};

use crate::error::MarketError;
use crate::queue::RequestQueue;

/// All requests by id plus the pending queue.
#[derive(Debug, Clone)]
pub struct RequestBook {
    requests: BTreeMap<RequestId, AuditRequest>,
    queue: RequestQueue,
    next_id: RequestId,
}

impl Default for RequestBook {
    fn default() -> Self {
        Self { requests: BTreeMap::new(), queue: RequestQueue::new(), next_id: RequestId::FIRST }
    }
}

impl RequestBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request and queue it under its price.
    pub fn enqueue(
        &mut self,
        requestor: AccountId,
        price: Amount,
        content_ref: impl Into<String>,
        height: Height,
    ) -> RequestId {
        let id = self.next_id;
        self.next_id = id.next();
        self.requests.insert(id, AuditRequest::new(id, requestor, price, content_ref, height));
        self.queue.push(price, id);
        id
    }

    /// Pop the best queued request at or above `min_price` and mark it
    /// assigned to `worker`.
    pub fn assign_next(
        &mut self,
        worker: &AccountId,
        min_price: Amount,
        height: Height,
    ) -> Option<&AuditRequest> {
        let (_, id) = self.queue.pop_eligible(min_price)?;
        let request = self.requests.get_mut(&id)?;
        request.state = RequestState::Assigned;
        request.assigned_worker = Some(worker.clone());
        request.assigned_at = Some(height);
        Some(request)
    }

    /// Take a still-queued request out of the queue.
    ///
    /// # Errors
    /// Returns [`MarketError::RequestNotFound`] or, if the request is not
    /// queued, [`MarketError::InvalidState`].
    pub fn dequeue(&mut self, id: RequestId) -> Result<&mut AuditRequest, MarketError> {
        let request = self.requests.get_mut(&id).ok_or(MarketError::RequestNotFound(id))?;
        if request.state != RequestState::Queued || !self.queue.remove(request.price, id) {
            return Err(MarketError::InvalidState {
                request_id: id,
                expected: "queued",
                actual: request.state,
            });
        }
        Ok(request)
    }

    /// Forget the most recently enqueued request and reuse its id.
    ///
    /// Returns `None`, changing nothing, unless `id` is the latest request and
    /// still queued.
    pub fn retract(&mut self, id: RequestId) -> Option<AuditRequest> {
        let request = self.requests.get(&id)?;
        if self.next_id != id.next() || request.state != RequestState::Queued {
            return None;
        }
        if !self.queue.remove(request.price, id) {
            return None;
        }
        self.next_id = id;
        self.requests.remove(&id)
    }

    /// Return a request taken out by [`dequeue`](Self::dequeue) to its old
    /// place in the queue.
    ///
    /// # Errors
    /// Returns [`MarketError::RequestNotFound`] for unknown ids.
    pub fn requeue(&mut self, id: RequestId) -> Result<(), MarketError> {
        let request = self.requests.get_mut(&id).ok_or(MarketError::RequestNotFound(id))?;
        request.state = RequestState::Queued;
        self.queue.restore(request.price, id);
        Ok(())
    }

    /// Look up a request.
    #[must_use]
    pub fn get(&self, id: RequestId) -> Option<&AuditRequest> {
        self.requests.get(&id)
    }

    /// Look up a request for mutation.
    ///
    /// # Errors
    /// Returns [`MarketError::RequestNotFound`] for unknown ids.
    pub fn get_mut(&mut self, id: RequestId) -> Result<&mut AuditRequest, MarketError> {
        self.requests.get_mut(&id).ok_or(MarketError::RequestNotFound(id))
    }

    /// The pending queue.
    #[must_use]
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requestor() -> AccountId {
        AccountId::new("requestor")
    }

    #[test]
    fn enqueue_assigns_sequential_ids_from_one() {
        let mut book = RequestBook::new();
        let a = book.enqueue(requestor(), Amount::new(5), "a", 1);
        let b = book.enqueue(requestor(), Amount::new(5), "b", 2);
        assert_eq!(a, RequestId::new(1));
        assert_eq!(b, RequestId::new(2));
        assert_eq!(book.queue().len(), 2);
        assert_eq!(book.get(b).map(|r| r.submitted_at), Some(2));
    }

    #[test]
    fn assign_next_marks_request_assigned() {
        let mut book = RequestBook::new();
        let id = book.enqueue(requestor(), Amount::new(5), "a", 1);
        let worker = AccountId::new("worker");
        let assigned = match book.assign_next(&worker, Amount::ZERO, 4) {
            Some(r) => r.clone(),
            None => panic!("expected an assignment"),
        };
        assert_eq!(assigned.id, id);
        assert_eq!(assigned.state, RequestState::Assigned);
        assert_eq!(assigned.assigned_worker, Some(worker));
        assert_eq!(assigned.assigned_at, Some(4));
        assert!(book.queue().is_empty());
    }

    #[test]
    fn assign_next_respects_floor() {
        let mut book = RequestBook::new();
        book.enqueue(requestor(), Amount::new(5), "a", 1);
        assert!(book.assign_next(&AccountId::new("w"), Amount::new(6), 2).is_none());
        assert_eq!(book.queue().len(), 1, "a miss must not touch the queue");
    }

    #[test]
    fn dequeue_rejects_assigned_request() {
        let mut book = RequestBook::new();
        let id = book.enqueue(requestor(), Amount::new(5), "a", 1);
        book.assign_next(&AccountId::new("w"), Amount::ZERO, 2);
        assert!(matches!(book.dequeue(id), Err(MarketError::InvalidState { .. })));
        assert!(matches!(
            book.dequeue(RequestId::new(99)),
            Err(MarketError::RequestNotFound(_))
        ));
    }

    #[test]
    fn retract_rewinds_the_newest_request_only() {
        let mut book = RequestBook::new();
        let first = book.enqueue(requestor(), Amount::new(5), "a", 1);
        let second = book.enqueue(requestor(), Amount::new(5), "b", 1);
        assert!(book.retract(first).is_none(), "only the newest request can be retracted");

        assert!(book.retract(second).is_some());
        assert!(book.get(second).is_none());
        assert_eq!(book.queue().len(), 1);
        assert_eq!(book.enqueue(requestor(), Amount::new(7), "c", 2), second);
    }

    #[test]
    fn requeue_restores_dequeued_request_in_order() {
        let mut book = RequestBook::new();
        let first = book.enqueue(requestor(), Amount::new(5), "a", 1);
        let second = book.enqueue(requestor(), Amount::new(5), "b", 1);
        assert!(book.dequeue(first).is_ok());
        if let Ok(request) = book.get_mut(first) {
            request.state = RequestState::Refunded;
        }

        assert!(book.requeue(first).is_ok());
        assert_eq!(book.get(first).map(|r| r.state), Some(RequestState::Queued));
        let popped = book.assign_next(&AccountId::new("w"), Amount::ZERO, 2).map(|r| r.id);
        assert_eq!(popped, Some(first));
        let popped = book.assign_next(&AccountId::new("w"), Amount::ZERO, 2).map(|r| r.id);
        assert_eq!(popped, Some(second));
    }
}
