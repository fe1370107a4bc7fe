use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Height};
use crate::id::{AccountId, ContentHash, RequestId};

/// Lifecycle state of an [`AuditRequest`].
///
/// ```text
/// None -> Queued -> Assigned -> Completed | Error
///            \          \
///             +----------+--> Refunded
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RequestState {
    /// Not known to the marketplace.
    #[default]
    None,
    /// Waiting in a price bucket.
    Queued,
    /// Handed to a worker, result outstanding.
    Assigned,
    /// Requestor took the price back. Terminal, never paid, never slashed.
    Refunded,
    /// Worker finished the audit; eligible for policing and payout.
    Completed,
    /// Worker reported that the audit could not be performed.
    Error,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::Refunded => "refunded",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Outcome a worker reports through `submit_result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AuditOutcome {
    /// The audit was performed.
    Completed,
    /// The audit failed.
    Error,
}

impl AuditOutcome {
    /// The request state this outcome moves an assigned request into.
    #[must_use]
    pub const fn state(self) -> RequestState {
        match self {
            Self::Completed => RequestState::Completed,
            Self::Error => RequestState::Error,
        }
    }
}

/// A unit of audit work submitted by a requestor.
///
/// Requests are never deleted; they remain as audit history after reaching a
/// terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AuditRequest {
    /// Sequential id, strictly increasing in submission order.
    pub id: RequestId,
    /// Who paid for the audit.
    pub requestor: AccountId,
    /// Price offered, fixed at creation.
    pub price: Amount,
    /// Opaque reference to the material under audit.
    pub content_ref: String,
    /// Current lifecycle state.
    pub state: RequestState,
    /// Worker holding the request, once assigned.
    pub assigned_worker: Option<AccountId>,
    /// Height at submission.
    pub submitted_at: Height,
    /// Height at assignment.
    pub assigned_at: Option<Height>,
    /// Height at which the worker submitted a result.
    pub completed_at: Option<Height>,
    /// Digest of the worker's result payload.
    pub report_hash: Option<ContentHash>,
    /// Whether the worker has been paid for this request.
    pub reward_paid: bool,
}

impl AuditRequest {
    /// Creates a freshly queued request.
    #[must_use]
    pub fn new(
        id: RequestId,
        requestor: AccountId,
        price: Amount,
        content_ref: impl Into<String>,
        submitted_at: Height,
    ) -> Self {
        Self {
            id,
            requestor,
            price,
            content_ref: content_ref.into(),
            state: RequestState::Queued,
            assigned_worker: None,
            submitted_at,
            assigned_at: None,
            completed_at: None,
            report_hash: None,
            reward_paid: false,
        }
    }

    /// Returns `true` if `worker` currently holds this request.
    #[must_use]
    pub fn is_assigned_to(&self, worker: &AccountId) -> bool {
        self.state == RequestState::Assigned && self.assigned_worker.as_ref() == Some(worker)
    }
}
