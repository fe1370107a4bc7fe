//! The coordinating marketplace service.
//!
//! [`Marketplace`] owns every book behind a single async mutex and exposes
//! the logical operations of the system. Each operation holds the lock from
//! start to finish, ledger calls included, so operations never interleave.
//!
//! Operations that move tokens mutate internal state first and call the
//! ledger last. Each such mutation is journaled as an [`Undo`] step; if the
//! ledger refuses, the journal is replayed backwards and the error is
//! returned. Events are published only after the operation commits.

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use warden_core::{
    AccountId, Amount, AuditOutcome, AuditRequest, ContentHash, Height, MarketConfig,
    PoliceAssignment, PoliceReport, RequestId, RequestState, VerificationState,
};

use crate::clock::Clock;
use crate::error::MarketError;
use crate::events::{EventSink, MarketEvent};
use crate::ledger::TokenLedger;
use crate::police::VerifierRotator;
use crate::requests::RequestBook;
use crate::rewards::ClaimPlan;
use crate::stake::StakeLedger;
use crate::verification::{ReportOutcome, VerificationAggregator, VerificationRecord};
use crate::workers::WorkerBook;

/// Whether a worker would receive a request right now, and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Availability {
    /// A request at or above the worker's floor is waiting.
    Ready,
    /// Nothing is queued at all.
    QueueEmpty,
    /// Requests are queued, but all below the worker's floor.
    BelowPriceFloor,
    /// The worker's stake is below the minimum.
    Understaked,
    /// The worker already holds the maximum number of requests.
    AtCapacity,
}

/// Every mutable book behind the marketplace lock.
#[derive(Debug)]
struct MarketState {
    config: MarketConfig,
    requests: RequestBook,
    workers: WorkerBook,
    rotator: VerifierRotator,
    verification: VerificationAggregator,
    stakes: StakeLedger,
}

/// The inverse of one mutation made ahead of a ledger call.
#[derive(Debug)]
enum Undo {
    /// Forget a request enqueued by the operation.
    Retract(RequestId),
    /// Put a dequeued request back in the queue.
    Requeue(RequestId),
    /// Reset a request's lifecycle state.
    RequestState(RequestId, RequestState),
    /// Give a released request back to its worker.
    Reassign { worker: AccountId, id: RequestId },
    /// Reset a stake balance.
    Stake { owner: AccountId, balance: Amount },
    /// Replace a verification record with an earlier copy.
    Record(VerificationRecord),
    /// Return a taken police assignment to its queue position.
    Assignment { index: usize, assignment: PoliceAssignment },
    /// Return a request to a worker's unpaid list.
    PendingPayout { worker: AccountId, id: RequestId },
    /// Bond a worker's stake to a request again.
    Bond { worker: AccountId, id: RequestId, window_ends_at: Height, height: Height },
    /// Mark a request unpaid.
    Unpaid(RequestId),
}

impl MarketState {
    /// Take back `journal`, newest step first.
    fn revert(&mut self, journal: Vec<Undo>) {
        for step in journal.into_iter().rev() {
            if let Err(e) = self.undo(step) {
                warn!(error = %e, "rollback step could not be applied");
            }
        }
    }

    fn undo(&mut self, step: Undo) -> Result<(), MarketError> {
        match step {
            Undo::Retract(id) => {
                self.requests.retract(id);
            }
            Undo::Requeue(id) => self.requests.requeue(id)?,
            Undo::RequestState(id, previous) => self.requests.get_mut(id)?.state = previous,
            Undo::Reassign { worker, id } => self.workers.record_assignment(&worker, id),
            Undo::Stake { owner, balance } => self.stakes.restore(&owner, balance),
            Undo::Record(record) => self.verification.restore(record),
            Undo::Assignment { index, assignment } => self.rotator.restore(index, assignment),
            Undo::PendingPayout { worker, id } => self.workers.add_pending_payout(&worker, id),
            Undo::Bond { worker, id, window_ends_at, height } => {
                self.workers.bond(&worker, id, window_ends_at, height);
            }
            Undo::Unpaid(id) => self.requests.get_mut(id)?.reward_paid = false,
        }
        Ok(())
    }
}

/// A token movement that concludes an operation.
enum Transfer<'a> {
    /// Pull `amount` from `from` into escrow.
    Deposit { from: &'a AccountId, amount: Amount },
    /// Pay `amount` out of escrow to `to`.
    Payout { to: &'a AccountId, amount: Amount },
}

/// Staked audit marketplace over a token ledger, a logical clock and an
/// event sink.
pub struct Marketplace<L: TokenLedger, C: Clock, E: EventSink> {
    ledger: L,
    clock: C,
    events: E,
    /// Receives slashed stake.
    police_sink: AccountId,
    state: Mutex<MarketState>,
}

impl<L: TokenLedger, C: Clock, E: EventSink> Marketplace<L, C, E> {
    /// Create a marketplace. The ledger's holder is the escrow account;
    /// `police_sink` receives slashed stake.
    ///
    /// # Errors
    /// Returns [`MarketError::Config`] if `config` fails validation.
    pub fn new(
        ledger: L,
        clock: C,
        events: E,
        police_sink: AccountId,
        config: MarketConfig,
    ) -> Result<Self, MarketError> {
        config.validate()?;
        let rotator = VerifierRotator::new(config.police_nodes_per_report);
        Ok(Self {
            ledger,
            clock,
            events,
            police_sink,
            state: Mutex::new(MarketState {
                config,
                requests: RequestBook::new(),
                workers: WorkerBook::new(),
                rotator,
                verification: VerificationAggregator::new(),
                stakes: StakeLedger::new(),
            }),
        })
    }

    /// The token ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The logical clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The event sink.
    pub fn events(&self) -> &E {
        &self.events
    }

    /// The escrow account holding request prices and stakes.
    pub fn escrow(&self) -> &AccountId {
        self.ledger.holder()
    }

    /// The account slashed stake is sent to.
    pub fn police_sink(&self) -> &AccountId {
        &self.police_sink
    }

    // ── Requests and assignment ──────────────────────────────────────────────

    /// Queue a new audit request and escrow its price.
    ///
    /// # Errors
    /// Returns [`MarketError::Ledger`] if the price cannot be pulled from
    /// `requestor`; the request is not created.
    pub async fn submit_request(
        &self,
        requestor: &AccountId,
        price: Amount,
        content_ref: impl Into<String>,
    ) -> Result<RequestId, MarketError> {
        let mut state = self.state.lock().await;
        let height = self.clock.height();

        let id = state.requests.enqueue(requestor.clone(), price, content_ref, height);
        if !price.is_zero() {
            let journal = vec![Undo::Retract(id)];
            self.conclude(&mut state, journal, Transfer::Deposit { from: requestor, amount: price })
                .await?;
        }

        info!(request_id = %id, requestor = %requestor, %price, height, "request queued");
        self.publish([MarketEvent::RequestQueued { request_id: id, requestor: requestor.clone(), price }]);
        Ok(id)
    }

    /// Hand `worker` the best queued request at or above its price floor.
    ///
    /// Returns `Ok(None)` when nothing qualifies; the queue is left intact.
    ///
    /// # Errors
    /// Returns [`MarketError::InsufficientStake`] if the worker is below the
    /// minimum stake and [`MarketError::CapacityReached`] if it already holds
    /// the maximum number of requests.
    pub async fn request_next(&self, worker: &AccountId) -> Result<Option<AuditRequest>, MarketError> {
        let mut state = self.state.lock().await;
        let height = self.clock.height();
        let MarketState { config, requests, workers, stakes, .. } = &mut *state;

        if !stakes.has_minimum(worker, config.min_stake) {
            return Err(MarketError::InsufficientStake {
                worker: worker.clone(),
                required: config.min_stake,
                actual: stakes.balance_of(worker),
            });
        }
        if workers.assigned_count(worker) >= config.max_assigned_requests {
            return Err(MarketError::CapacityReached {
                worker: worker.clone(),
                limit: config.max_assigned_requests,
            });
        }

        let min_price = workers.min_price(worker);
        let Some(request) = requests.assign_next(worker, min_price, height).cloned() else {
            debug!(worker = %worker, %min_price, "no eligible request at price floor");
            self.publish([MarketEvent::NoEligibleRequest { worker: worker.clone(), min_price }]);
            return Ok(None);
        };
        workers.record_assignment(worker, request.id);

        info!(request_id = %request.id, worker = %worker, price = %request.price, "request assigned");
        self.publish([MarketEvent::RequestAssigned {
            request_id: request.id,
            worker: worker.clone(),
            price: request.price,
        }]);
        Ok(Some(request))
    }

    /// Set the lowest price `worker` will accept. Takes effect on the next pop.
    pub async fn set_min_price(&self, worker: &AccountId, price: Amount) {
        self.state.lock().await.workers.set_min_price(worker, price);
        debug!(worker = %worker, %price, "worker price floor changed");
        self.publish([MarketEvent::MinPriceChanged { worker: worker.clone(), min_price: price }]);
    }

    /// Record the assigned worker's result for `request_id`.
    ///
    /// A completed result opens verification, assigns verifiers, and bonds
    /// the worker's stake until the police window closes.
    ///
    /// # Errors
    /// Returns [`MarketError::RequestNotFound`] for unknown ids,
    /// [`MarketError::InvalidState`] if the request is not assigned, and
    /// [`MarketError::Unauthorized`] if `worker` does not hold it.
    pub async fn submit_result(
        &self,
        worker: &AccountId,
        request_id: RequestId,
        outcome: AuditOutcome,
        payload: &[u8],
    ) -> Result<RequestState, MarketError> {
        let mut state = self.state.lock().await;
        let height = self.clock.height();
        let MarketState { config, requests, workers, rotator, verification, .. } = &mut *state;

        let request = requests.get_mut(request_id)?;
        if request.state != RequestState::Assigned {
            return Err(MarketError::InvalidState {
                request_id,
                expected: "assigned",
                actual: request.state,
            });
        }
        if !request.is_assigned_to(worker) {
            return Err(MarketError::Unauthorized { caller: worker.clone(), action: "submit this result" });
        }

        let report_hash = ContentHash::digest(payload);
        request.state = outcome.state();
        request.completed_at = Some(height);
        request.report_hash = Some(report_hash);
        workers.release_assignment(worker, request_id);

        let mut events = vec![MarketEvent::ResultSubmitted {
            request_id,
            worker: worker.clone(),
            state: request.state,
            report_hash,
        }];
        if outcome == AuditOutcome::Completed {
            let window_ends_at = height.saturating_add(config.police_timeout);
            let verifiers = rotator.assign(request_id, height, window_ends_at);
            verification.open(request_id, window_ends_at, verifiers.iter().cloned());
            workers.add_pending_payout(worker, request_id);
            workers.bond(worker, request_id, window_ends_at, height);
            if !verifiers.is_empty() {
                events.push(MarketEvent::PoliceAssigned { request_id, verifiers });
            }
        }

        info!(request_id = %request_id, worker = %worker, state = %outcome.state(), "result submitted");
        self.publish(events);
        Ok(outcome.state())
    }

    /// Return the price of a queued request, or of an assigned request whose
    /// worker has let the audit timeout lapse, to its requestor.
    ///
    /// # Errors
    /// Returns [`MarketError::Unauthorized`] if `requestor` did not submit the
    /// request, [`MarketError::InvalidState`] if it is neither queued nor
    /// lapsed, and [`MarketError::Ledger`] if the refund transfer fails.
    pub async fn refund(&self, requestor: &AccountId, request_id: RequestId) -> Result<Amount, MarketError> {
        let mut state = self.state.lock().await;
        let height = self.clock.height();
        let MarketState { config, requests, workers, .. } = &mut *state;

        let request = requests.get(request_id).ok_or(MarketError::RequestNotFound(request_id))?;
        if request.requestor != *requestor {
            return Err(MarketError::Unauthorized { caller: requestor.clone(), action: "refund this request" });
        }
        let lapsed = request
            .assigned_at
            .is_some_and(|at| height > at.saturating_add(config.audit_timeout));
        let (price, current, holder) = (request.price, request.state, request.assigned_worker.clone());
        let mut journal = Vec::new();
        match current {
            RequestState::Queued => {
                requests.dequeue(request_id)?;
                journal.push(Undo::Requeue(request_id));
            }
            RequestState::Assigned if lapsed => {
                journal.push(Undo::RequestState(request_id, current));
                if let Some(worker) = holder {
                    if workers.release_assignment(&worker, request_id) {
                        journal.push(Undo::Reassign { worker, id: request_id });
                    }
                }
            }
            actual => {
                return Err(MarketError::InvalidState {
                    request_id,
                    expected: "queued or lapsed assignment",
                    actual,
                });
            }
        }
        requests.get_mut(request_id)?.state = RequestState::Refunded;

        if !price.is_zero() {
            self.conclude(&mut state, journal, Transfer::Payout { to: requestor, amount: price })
                .await?;
        }
        info!(request_id = %request_id, requestor = %requestor, %price, "request refunded");
        self.publish([MarketEvent::RequestRefunded {
            request_id,
            requestor: requestor.clone(),
            amount: price,
        }]);
        Ok(price)
    }

    // ── Police ───────────────────────────────────────────────────────────────

    /// File a verifier's verdict on a completed request.
    ///
    /// A late report is not an error: it yields
    /// [`ReportOutcome::WindowExceeded`] and the assignment is dropped. A
    /// negative verdict slashes the worker once per request and releases the
    /// request's bond. A worker with no stake left is logged and the report
    /// still stands.
    ///
    /// # Errors
    /// Returns [`MarketError::Unauthorized`] if `verifier` is not active,
    /// [`MarketError::RequestNotFound`] for unknown ids,
    /// [`MarketError::NotAssigned`] if the verifier holds no assignment, and
    /// [`MarketError::Ledger`] if the slashed stake cannot be moved.
    pub async fn submit_report(
        &self,
        verifier: &AccountId,
        request_id: RequestId,
        payload: Vec<u8>,
        is_valid: bool,
    ) -> Result<ReportOutcome, MarketError> {
        let mut state = self.state.lock().await;
        let height = self.clock.height();
        if !state.rotator.is_active(verifier) {
            return Err(MarketError::Unauthorized { caller: verifier.clone(), action: "submit police reports" });
        }
        let worker = state
            .requests
            .get(request_id)
            .ok_or(MarketError::RequestNotFound(request_id))?
            .assigned_worker
            .clone();
        let MarketState { config, workers, rotator, verification, stakes, .. } = &mut *state;

        let mut journal = Vec::new();
        if let Some(record) = verification.record(request_id) {
            journal.push(Undo::Record(record.clone()));
        }
        if let Some((index, assignment)) = rotator.slot(request_id, verifier) {
            journal.push(Undo::Assignment { index, assignment });
        }
        let outcome = verification.submit_report(rotator, request_id, verifier, payload, is_valid, height)?;
        let ReportOutcome::Recorded { state: verdict, slash } = outcome else {
            warn!(request_id = %request_id, verifier = %verifier, height, "police report after submission window");
            self.publish([MarketEvent::SubmissionWindowExceeded {
                request_id,
                verifier: verifier.clone(),
            }]);
            return Ok(outcome);
        };

        let mut events = vec![MarketEvent::ReportSubmitted {
            request_id,
            verifier: verifier.clone(),
            state: verdict,
        }];
        if let (true, Some(worker)) = (slash, worker) {
            if workers.remove_pending_payout(&worker, request_id) {
                journal.push(Undo::PendingPayout { worker: worker.clone(), id: request_id });
            }
            if let Some(window_ends_at) = verification.record(request_id).map(|r| r.window_ends_at) {
                if workers.release_bond(&worker, request_id, window_ends_at) {
                    journal.push(Undo::Bond { worker: worker.clone(), id: request_id, window_ends_at, height });
                }
            }
            let previous = stakes.balance_of(&worker);
            match stakes.slash(&worker, config) {
                Ok(amount) => {
                    journal.push(Undo::Stake { owner: worker.clone(), balance: previous });
                    self.conclude(&mut state, journal, Transfer::Payout { to: &self.police_sink, amount })
                        .await?;
                    warn!(request_id = %request_id, worker = %worker, %amount, "worker slashed");
                    events.push(MarketEvent::Slashed {
                        request_id,
                        worker,
                        verifier: verifier.clone(),
                        amount,
                    });
                }
                Err(MarketError::NothingToSlash(_)) => {
                    warn!(request_id = %request_id, worker = %worker, "negative verdict without stake to slash");
                }
                Err(e) => {
                    state.revert(journal);
                    return Err(e);
                }
            }
        }

        info!(request_id = %request_id, verifier = %verifier, state = ?verdict, "police report submitted");
        self.publish(events);
        Ok(outcome)
    }

    /// Oldest live assignment of `verifier`, purging expired ones on the way.
    pub async fn next_police_assignment(&self, verifier: &AccountId) -> Option<RequestId> {
        let height = self.clock.height();
        self.state.lock().await.rotator.next_assignment(verifier, height)
    }

    /// Whether `verifier` holds a live assignment for `request_id`.
    pub async fn is_police_assigned(&self, request_id: RequestId, verifier: &AccountId) -> bool {
        let height = self.clock.height();
        self.state.lock().await.rotator.is_assigned(request_id, verifier, height)
    }

    /// Add a verifier to the end of the rotation. Returns `false` if already active.
    pub async fn add_verifier(&self, verifier: &AccountId) -> bool {
        let added = self.state.lock().await.rotator.add_verifier(verifier.clone());
        if added {
            info!(verifier = %verifier, "verifier added");
            self.publish([MarketEvent::VerifierAdded { verifier: verifier.clone() }]);
        }
        added
    }

    /// Remove a verifier and its outstanding assignments. Returns `false` if not active.
    pub async fn remove_verifier(&self, verifier: &AccountId) -> bool {
        let removed = self.state.lock().await.rotator.remove_verifier(verifier);
        if removed {
            info!(verifier = %verifier, "verifier removed");
            self.publish([MarketEvent::VerifierRemoved { verifier: verifier.clone() }]);
        }
        removed
    }

    /// Number of active verifiers.
    pub async fn police_count(&self) -> usize {
        self.state.lock().await.rotator.len()
    }

    /// Recorded verification state of `request_id`.
    pub async fn verification_state(&self, request_id: RequestId) -> Option<VerificationState> {
        self.state.lock().await.verification.state(request_id)
    }

    /// The report `verifier` filed on `request_id`.
    pub async fn police_report(&self, request_id: RequestId, verifier: &AccountId) -> Option<PoliceReport> {
        self.state.lock().await.verification.report(request_id, verifier).cloned()
    }

    // ── Stake and rewards ────────────────────────────────────────────────────

    /// Escrow `amount` from `owner` as stake. Returns the new stake.
    ///
    /// # Errors
    /// Returns [`MarketError::InvalidAmount`] for a zero amount and
    /// [`MarketError::Ledger`] if the tokens cannot be pulled.
    pub async fn stake(&self, owner: &AccountId, amount: Amount) -> Result<Amount, MarketError> {
        let mut state = self.state.lock().await;
        let previous = state.stakes.balance_of(owner);
        let balance = state.stakes.deposit(owner, amount)?;
        let journal = vec![Undo::Stake { owner: owner.clone(), balance: previous }];
        self.conclude(&mut state, journal, Transfer::Deposit { from: owner, amount }).await?;

        info!(owner = %owner, %amount, %balance, "stake deposited");
        self.publish([MarketEvent::Staked { owner: owner.clone(), amount }]);
        Ok(balance)
    }

    /// Return `owner`'s whole stake.
    ///
    /// # Errors
    /// Returns [`MarketError::StakeLocked`] while the owner holds assigned
    /// requests or completed requests whose police window is still open,
    /// paid or not,
    /// [`MarketError::InvalidAmount`] if there is no stake, and
    /// [`MarketError::Ledger`] if the payout fails.
    pub async fn unstake(&self, owner: &AccountId) -> Result<Amount, MarketError> {
        let mut state = self.state.lock().await;
        let height = self.clock.height();
        let outstanding = state.workers.outstanding(owner, height);
        if outstanding > 0 {
            return Err(MarketError::StakeLocked { owner: owner.clone(), outstanding });
        }

        let amount = state.stakes.withdraw_all(owner)?;
        let journal = vec![Undo::Stake { owner: owner.clone(), balance: amount }];
        self.conclude(&mut state, journal, Transfer::Payout { to: owner, amount }).await?;

        info!(owner = %owner, %amount, "stake withdrawn");
        self.publish([MarketEvent::Unstaked { owner: owner.clone(), amount }]);
        Ok(amount)
    }

    /// Pay `worker` for every completed request whose verification has
    /// resolved to valid or expired, in one transfer.
    ///
    /// Requests still under verification stay pending; invalid ones are
    /// dropped for good.
    ///
    /// # Errors
    /// Returns [`MarketError::NothingToClaim`] if nothing is payable and
    /// nothing is pending, and [`MarketError::Ledger`] if the payout fails.
    pub async fn claim_rewards(&self, worker: &AccountId) -> Result<ClaimPlan, MarketError> {
        let mut state = self.state.lock().await;
        let height = self.clock.height();
        let plan = ClaimPlan::build(worker, height, &state.requests, &state.workers, &state.verification)?;

        let mut journal = Vec::new();
        for (id, _) in &plan.payouts {
            if let Some(record) = state.verification.record(*id) {
                journal.push(Undo::Record(record.clone()));
            }
            journal.push(Undo::Unpaid(*id));
            journal.push(Undo::PendingPayout { worker: worker.clone(), id: *id });
        }
        for id in &plan.forfeited {
            journal.push(Undo::PendingPayout { worker: worker.clone(), id: *id });
        }

        let MarketState { requests, workers, verification, .. } = &mut *state;
        if let Err(e) = plan.apply(height, requests, workers, verification) {
            state.revert(journal);
            return Err(e);
        }
        if !plan.total.is_zero() {
            self.conclude(&mut state, journal, Transfer::Payout { to: worker, amount: plan.total })
                .await?;
        }

        info!(
            worker = %worker,
            paid = plan.payouts.len(),
            total = %plan.total,
            pending = plan.still_pending.len(),
            forfeited = plan.forfeited.len(),
            "rewards claimed"
        );
        self.publish(plan.payouts.iter().map(|(request_id, amount)| MarketEvent::RewardPaid {
            request_id: *request_id,
            worker: worker.clone(),
            amount: *amount,
        }));
        Ok(plan)
    }

    /// Current stake of `owner`.
    pub async fn stake_of(&self, owner: &AccountId) -> Amount {
        self.state.lock().await.stakes.balance_of(owner)
    }

    /// Whether `owner` meets the minimum stake.
    pub async fn has_enough_stake(&self, owner: &AccountId) -> bool {
        let state = self.state.lock().await;
        state.stakes.has_minimum(owner, state.config.min_stake)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Snapshot of a request.
    pub async fn request(&self, request_id: RequestId) -> Option<AuditRequest> {
        self.state.lock().await.requests.get(request_id).cloned()
    }

    /// Number of queued requests.
    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.requests.queue().len()
    }

    /// Price floor of `worker`.
    pub async fn min_price(&self, worker: &AccountId) -> Amount {
        self.state.lock().await.workers.min_price(worker)
    }

    /// Requests `worker` currently holds.
    pub async fn assigned_count(&self, worker: &AccountId) -> usize {
        self.state.lock().await.workers.assigned_count(worker)
    }

    /// Whether [`request_next`](Self::request_next) would hand `worker` a request.
    pub async fn any_request_available(&self, worker: &AccountId) -> Availability {
        let state = self.state.lock().await;
        let queue = state.requests.queue();
        if !state.stakes.has_minimum(worker, state.config.min_stake) {
            Availability::Understaked
        } else if state.workers.assigned_count(worker) >= state.config.max_assigned_requests {
            Availability::AtCapacity
        } else if queue.is_empty() {
            Availability::QueueEmpty
        } else if queue.has_eligible(state.workers.min_price(worker)) {
            Availability::Ready
        } else {
            Availability::BelowPriceFloor
        }
    }

    /// Current configuration.
    pub async fn config(&self) -> MarketConfig {
        self.state.lock().await.config.clone()
    }

    // ── Administration ───────────────────────────────────────────────────────

    /// Apply `change` to a copy of the configuration and adopt it if it validates.
    ///
    /// # Errors
    /// Returns [`MarketError::Config`] if the changed configuration is invalid;
    /// the current configuration is kept.
    pub async fn update_config(
        &self,
        change: impl FnOnce(&mut MarketConfig),
    ) -> Result<MarketConfig, MarketError> {
        let mut state = self.state.lock().await;
        let mut candidate = state.config.clone();
        change(&mut candidate);
        candidate.validate()?;
        state.rotator.set_nodes_per_report(candidate.police_nodes_per_report);
        state.config = candidate.clone();
        info!(config = ?candidate, "market config updated");
        Ok(candidate)
    }

    /// Set how many verifiers each completed request receives.
    ///
    /// # Errors
    /// Returns [`MarketError::Config`] for zero.
    pub async fn set_police_nodes_per_report(&self, nodes: usize) -> Result<(), MarketError> {
        self.update_config(|c| c.police_nodes_per_report = nodes).await.map(drop)
    }

    /// Set the police submission window for requests completed from now on.
    /// Windows already opened keep their end height.
    ///
    /// # Errors
    /// Propagates [`MarketError::Config`] from validation.
    pub async fn set_police_timeout(&self, timeout: Height) -> Result<(), MarketError> {
        self.update_config(|c| c.police_timeout = timeout).await.map(drop)
    }

    /// Set how long an assignment may sit before its requestor can reclaim it.
    ///
    /// # Errors
    /// Propagates [`MarketError::Config`] from validation.
    pub async fn set_audit_timeout(&self, timeout: Height) -> Result<(), MarketError> {
        self.update_config(|c| c.audit_timeout = timeout).await.map(drop)
    }

    /// Set how many requests a worker may hold at once.
    ///
    /// # Errors
    /// Returns [`MarketError::Config`] for zero.
    pub async fn set_max_assigned_requests(&self, max: usize) -> Result<(), MarketError> {
        self.update_config(|c| c.max_assigned_requests = max).await.map(drop)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Perform the operation's token movement; on failure take back every
    /// step in `journal`.
    async fn conclude(
        &self,
        state: &mut MarketState,
        journal: Vec<Undo>,
        transfer: Transfer<'_>,
    ) -> Result<(), MarketError> {
        let result = match transfer {
            Transfer::Deposit { from, amount } => {
                self.ledger.transfer_from(from, self.ledger.holder(), amount).await
            }
            Transfer::Payout { to, amount } => self.ledger.transfer(to, amount).await,
        };
        if let Err(e) = result {
            warn!(error = %e, steps = journal.len(), "ledger rejected transfer, rolling back");
            state.revert(journal);
            return Err(e.into());
        }
        Ok(())
    }

    fn publish(&self, events: impl IntoIterator<Item = MarketEvent>) {
        for event in events {
            self.events.emit(&event);
        }
    }
}
