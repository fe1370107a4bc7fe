//! Domain events and where they go.
//!
//! The marketplace emits one [`MarketEvent`] per observable effect, after the
//! operation that produced it has committed. Delivery is delegated to an
//! [`EventSink`].

use std::sync::Mutex;

use serde::Serialize;
use warden_core::{AccountId, Amount, ContentHash, RequestId, RequestState, VerificationState};

/// An observable effect of a marketplace operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[non_exhaustive]
pub enum MarketEvent {
    RequestQueued { request_id: RequestId, requestor: AccountId, price: Amount },
    RequestAssigned { request_id: RequestId, worker: AccountId, price: Amount },
    /// The queue holds nothing at or above the worker's price floor.
    NoEligibleRequest { worker: AccountId, min_price: Amount },
    MinPriceChanged { worker: AccountId, min_price: Amount },
    ResultSubmitted {
        request_id: RequestId,
        worker: AccountId,
        state: RequestState,
        report_hash: ContentHash,
    },
    PoliceAssigned { request_id: RequestId, verifiers: Vec<AccountId> },
    ReportSubmitted {
        request_id: RequestId,
        verifier: AccountId,
        state: VerificationState,
    },
    /// A police report arrived after the submission window and was discarded.
    SubmissionWindowExceeded { request_id: RequestId, verifier: AccountId },
    Slashed {
        request_id: RequestId,
        worker: AccountId,
        verifier: AccountId,
        amount: Amount,
    },
    RewardPaid { request_id: RequestId, worker: AccountId, amount: Amount },
    RequestRefunded { request_id: RequestId, requestor: AccountId, amount: Amount },
    Staked { owner: AccountId, amount: Amount },
    Unstaked { owner: AccountId, amount: Amount },
    VerifierAdded { verifier: AccountId },
    VerifierRemoved { verifier: AccountId },
}

impl MarketEvent {
    /// Short snake-case name, matching the serialized `event` tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestQueued { .. } => "request_queued",
            Self::RequestAssigned { .. } => "request_assigned",
            Self::NoEligibleRequest { .. } => "no_eligible_request",
            Self::MinPriceChanged { .. } => "min_price_changed",
            Self::ResultSubmitted { .. } => "result_submitted",
            Self::PoliceAssigned { .. } => "police_assigned",
            Self::ReportSubmitted { .. } => "report_submitted",
            Self::SubmissionWindowExceeded { .. } => "submission_window_exceeded",
            Self::Slashed { .. } => "slashed",
            Self::RewardPaid { .. } => "reward_paid",
            Self::RequestRefunded { .. } => "request_refunded",
            Self::Staked { .. } => "staked",
            Self::Unstaked { .. } => "unstaked",
            Self::VerifierAdded { .. } => "verifier_added",
            Self::VerifierRemoved { .. } => "verifier_removed",
        }
    }
}

/// Consumer of marketplace events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: &MarketEvent);
}

/// Writes every event to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &MarketEvent) {
        tracing::info!(event = event.name(), detail = ?event, "market event");
    }
}

/// Buffers events in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<MarketEvent>>,
}

impl MemoryEventSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything buffered so far.
    ///
    /// # Panics
    /// Panics if the internal `Mutex` is poisoned.
    pub fn drain(&self) -> Vec<MarketEvent> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut events = self.events.lock().expect("event buffer lock poisoned");
        std::mem::take(&mut *events)
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &MarketEvent) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.events.lock().expect("event buffer lock poisoned").push(event.clone());
    }
}
