//! Batched reward claims.
//!
//! A claim is computed read-only as a [`ClaimPlan`] and then applied, so a
//! claim that fails leaves every book untouched.

use warden_core::{AccountId, Amount, Height, RequestId, VerificationState};

use crate::error::MarketError;
use crate::requests::RequestBook;
use crate::verification::VerificationAggregator;
use crate::workers::WorkerBook;

/// What a single claim will do.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ClaimPlan {
    /// The claiming worker.
    pub worker: AccountId,
    /// Requests paid now, with their price, oldest first.
    pub payouts: Vec<(RequestId, Amount)>,
    /// Sum of `payouts`.
    pub total: Amount,
    /// Requests dropped for good because they were found invalid.
    pub forfeited: Vec<RequestId>,
    /// Requests left for a later claim because verification is still open.
    pub still_pending: Vec<RequestId>,
}

impl ClaimPlan {
    /// Work out which of `worker`'s unpaid results can be paid at `height`.
    ///
    /// # Errors
    /// Returns [`MarketError::NothingToClaim`] when nothing is payable and
    /// nothing is still awaiting verification.
    /// Returns [`MarketError::InvalidAmount`] if the payout total overflows.
    pub fn build(
        worker: &AccountId,
        height: Height,
        requests: &RequestBook,
        workers: &WorkerBook,
        verification: &VerificationAggregator,
    ) -> Result<Self, MarketError> {
        let mut plan = Self {
            worker: worker.clone(),
            payouts: Vec::new(),
            total: Amount::ZERO,
            forfeited: Vec::new(),
            still_pending: Vec::new(),
        };
        for id in workers.pending_payouts(worker) {
            let Some(request) = requests.get(id).filter(|r| !r.reward_paid) else {
                plan.forfeited.push(id);
                continue;
            };
            match verification.resolve(id, height) {
                Some(state) if state.is_payable() => {
                    plan.total = plan
                        .total
                        .checked_add(request.price)
                        .ok_or(MarketError::InvalidAmount(request.price))?;
                    plan.payouts.push((id, request.price));
                }
                Some(VerificationState::Unverified) => plan.still_pending.push(id),
                _ => plan.forfeited.push(id),
            }
        }
        if plan.payouts.is_empty() && plan.still_pending.is_empty() {
            return Err(MarketError::NothingToClaim(worker.clone()));
        }
        Ok(plan)
    }

    /// Mark paid requests, persist expired verdicts, and clear settled entries
    /// from the worker's pending list.
    ///
    /// # Errors
    /// Returns [`MarketError::RequestNotFound`] if a planned request vanished.
    pub fn apply(
        &self,
        height: Height,
        requests: &mut RequestBook,
        workers: &mut WorkerBook,
        verification: &mut VerificationAggregator,
    ) -> Result<(), MarketError> {
        for (id, _) in &self.payouts {
            verification.settle(*id, height);
            requests.get_mut(*id)?.reward_paid = true;
            workers.remove_pending_payout(&self.worker, *id);
        }
        for id in &self.forfeited {
            workers.remove_pending_payout(&self.worker, *id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::police::VerifierRotator;

    struct Books {
        requests: RequestBook,
        workers: WorkerBook,
        verification: VerificationAggregator,
        rotator: VerifierRotator,
    }

    fn worker() -> AccountId {
        AccountId::new("auditor")
    }

    fn police() -> AccountId {
        AccountId::new("police1")
    }

    /// Completes one request per price, each with a window ending at `window_end`.
    fn completed(prices: &[u128], window_end: Height) -> (Books, Vec<RequestId>) {
        let mut books = Books {
            requests: RequestBook::new(),
            workers: WorkerBook::new(),
            verification: VerificationAggregator::new(),
            rotator: VerifierRotator::new(1),
        };
        books.rotator.add_verifier(police());
        let mut ids = Vec::new();
        for price in prices {
            let id = books.requests.enqueue(AccountId::new("req"), Amount::new(*price), "c", 0);
            books.requests.assign_next(&worker(), Amount::ZERO, 0);
            let assigned = books.rotator.assign(id, 0, window_end);
            books.verification.open(id, window_end, assigned);
            books.workers.add_pending_payout(&worker(), id);
            ids.push(id);
        }
        (books, ids)
    }

    fn plan(books: &Books, height: Height) -> Result<ClaimPlan, MarketError> {
        ClaimPlan::build(&worker(), height, &books.requests, &books.workers, &books.verification)
    }

    fn verdict(books: &mut Books, id: RequestId, is_valid: bool) {
        if let Err(e) = books.verification.submit_report(
            &mut books.rotator,
            id,
            &police(),
            Vec::new(),
            is_valid,
            1,
        ) {
            panic!("report failed: {e}");
        }
    }

    #[test]
    fn unknown_worker_has_nothing_to_claim() {
        let (books, _) = completed(&[], 10);
        assert!(matches!(plan(&books, 0), Err(MarketError::NothingToClaim(_))));
    }

    #[test]
    fn pending_requests_make_claim_succeed_with_zero_payout() {
        let (books, ids) = completed(&[100], 10);
        let claim = match plan(&books, 5) {
            Ok(p) => p,
            Err(e) => panic!("claim should succeed: {e}"),
        };
        assert!(claim.payouts.is_empty());
        assert_eq!(claim.still_pending, ids);
        assert_eq!(claim.total, Amount::ZERO);
    }

    #[test]
    fn expired_and_valid_requests_are_paid_together() {
        let (mut books, ids) = completed(&[100, 50, 7], 10);
        verdict(&mut books, ids[1], true);
        verdict(&mut books, ids[2], false);
        let claim = match plan(&books, 11) {
            Ok(p) => p,
            Err(e) => panic!("claim failed: {e}"),
        };
        assert_eq!(claim.payouts, [(ids[0], Amount::new(100)), (ids[1], Amount::new(50))]);
        assert_eq!(claim.total, Amount::new(150));
        assert_eq!(claim.forfeited, [ids[2]]);

        if let Err(e) =
            claim.apply(11, &mut books.requests, &mut books.workers, &mut books.verification)
        {
            panic!("apply failed: {e}");
        }
        assert_eq!(books.verification.state(ids[0]), Some(VerificationState::Expired));
        assert!(books.requests.get(ids[0]).is_some_and(|r| r.reward_paid));
        assert!(books.workers.pending_payouts(&worker()).is_empty());
        assert!(matches!(plan(&books, 12), Err(MarketError::NothingToClaim(_))));
    }

    #[test]
    fn only_invalid_requests_leave_nothing_to_claim() {
        let (mut books, ids) = completed(&[100], 10);
        verdict(&mut books, ids[0], false);
        assert!(matches!(plan(&books, 20), Err(MarketError::NothingToClaim(_))));
    }

    #[test]
    fn valid_request_pays_before_window_closes() {
        let (mut books, ids) = completed(&[100], 10);
        verdict(&mut books, ids[0], true);
        let claim = match plan(&books, 2) {
            Ok(p) => p,
            Err(e) => panic!("claim failed: {e}"),
        };
        assert_eq!(claim.total, Amount::new(100));
    }
}
