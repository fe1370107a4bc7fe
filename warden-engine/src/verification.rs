//! Per-request verification records and the police report protocol.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use warden_core::{AccountId, Height, PoliceReport, RequestId, VerificationState};

use crate::error::MarketError;
use crate::police::VerifierRotator;

/// Verification status of one completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct VerificationRecord {
    /// The request under verification.
    pub request_id: RequestId,
    /// Current verdict.
    pub state: VerificationState,
    /// Last height at which reports are accepted, fixed at completion.
    pub window_ends_at: Height,
    /// Verifiers assigned to this request that have not yet reported or
    /// been turned away as late.
    pub awaiting: BTreeSet<AccountId>,
    /// Reports received, by verifier.
    pub reports: BTreeMap<AccountId, PoliceReport>,
}

/// What happened to a submitted police report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The report was recorded. `slash` is set when this report moved the
    /// request to `Invalid` and the worker must be penalised.
    Recorded { state: VerificationState, slash: bool },
    /// The report arrived after the window; the assignment was discarded and
    /// the record left untouched.
    WindowExceeded,
}

/// All verification records, keyed by request.
#[derive(Debug, Clone, Default)]
pub struct VerificationAggregator {
    records: HashMap<RequestId, VerificationRecord>,
}

impl VerificationAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly completed request checked by `verifiers`.
    pub fn open(
        &mut self,
        request_id: RequestId,
        window_ends_at: Height,
        verifiers: impl IntoIterator<Item = AccountId>,
    ) {
        self.records.insert(
            request_id,
            VerificationRecord {
                request_id,
                state: VerificationState::Unverified,
                window_ends_at,
                awaiting: verifiers.into_iter().collect(),
                reports: BTreeMap::new(),
            },
        );
    }

    /// Put back a record captured with [`record`](Self::record).
    pub fn restore(&mut self, record: VerificationRecord) {
        self.records.insert(record.request_id, record);
    }

    /// Accept a verifier's verdict on `request_id`.
    ///
    /// A negative verdict makes the record `Invalid` for good; a positive one
    /// only lifts `Unverified` to `Valid`. Either way the verifier's
    /// assignment is consumed.
    ///
    /// A verifier that was never assigned, or has already been answered, gets
    /// `NotAssigned` whether or not the window is still open.
    ///
    /// # Errors
    /// Returns [`MarketError::NotAssigned`] if the request has no record or
    /// the verifier holds no assignment for it. Nothing is changed.
    pub fn submit_report(
        &mut self,
        rotator: &mut VerifierRotator,
        request_id: RequestId,
        verifier: &AccountId,
        payload: Vec<u8>,
        is_valid: bool,
        height: Height,
    ) -> Result<ReportOutcome, MarketError> {
        let not_assigned = || MarketError::NotAssigned { request_id, verifier: verifier.clone() };
        let record = self.records.get_mut(&request_id).ok_or_else(not_assigned)?;
        if !record.awaiting.contains(verifier) {
            return Err(not_assigned());
        }

        if height > record.window_ends_at {
            rotator.take(request_id, verifier);
            record.awaiting.remove(verifier);
            return Ok(ReportOutcome::WindowExceeded);
        }
        rotator.take(request_id, verifier).ok_or_else(not_assigned)?;
        record.awaiting.remove(verifier);

        record.reports.insert(verifier.clone(), PoliceReport::new(payload, is_valid, height));
        let previous = record.state;
        if is_valid {
            if previous == VerificationState::Unverified {
                record.state = VerificationState::Valid;
            }
        } else {
            record.state = VerificationState::Invalid;
        }
        Ok(ReportOutcome::Recorded {
            state: record.state,
            slash: !is_valid && previous != VerificationState::Invalid,
        })
    }

    /// The verdict `request_id` resolves to at `height`, without recording it.
    ///
    /// `Unverified` past the window reads as `Expired`. Returns `None` for
    /// requests that were never opened.
    #[must_use]
    pub fn resolve(&self, request_id: RequestId, height: Height) -> Option<VerificationState> {
        let record = self.records.get(&request_id)?;
        Some(match record.state {
            VerificationState::Unverified if height > record.window_ends_at => {
                VerificationState::Expired
            }
            state => state,
        })
    }

    /// Like [`resolve`](Self::resolve), but persists an `Expired` verdict.
    pub fn settle(&mut self, request_id: RequestId, height: Height) -> Option<VerificationState> {
        let resolved = self.resolve(request_id, height)?;
        if let Some(record) = self.records.get_mut(&request_id) {
            record.state = resolved;
        }
        Some(resolved)
    }

    /// Recorded state of `request_id`.
    #[must_use]
    pub fn state(&self, request_id: RequestId) -> Option<VerificationState> {
        self.records.get(&request_id).map(|r| r.state)
    }

    /// Full record of `request_id`.
    #[must_use]
    pub fn record(&self, request_id: RequestId) -> Option<&VerificationRecord> {
        self.records.get(&request_id)
    }

    /// The report `verifier` filed on `request_id`, if any.
    #[must_use]
    pub fn report(&self, request_id: RequestId, verifier: &AccountId) -> Option<&PoliceReport> {
        self.records.get(&request_id)?.reports.get(verifier)
    }
}
