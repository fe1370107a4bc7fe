//! Error types for the engine crate.

use warden_core::{AccountId, Amount, CoreError, RequestId, RequestState};

use crate::ledger::LedgerError;

/// Errors returned by marketplace operations.
///
/// Every error aborts the operation with no partial effect.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MarketError {
    /// The caller lacks the role or relationship the operation requires.
    #[error("{caller} is not authorized to {action}")]
    Unauthorized { caller: AccountId, action: &'static str },

    /// The request is not in the lifecycle state the operation requires.
    #[error("request {request_id} is {actual}, expected {expected}")]
    InvalidState {
        request_id: RequestId,
        expected: &'static str,
        actual: RequestState,
    },

    /// The worker's stake is below the configured minimum.
    #[error("insufficient stake for {worker}: required {required}, staked {actual}")]
    InsufficientStake {
        worker: AccountId,
        required: Amount,
        actual: Amount,
    },

    /// The worker already holds the maximum number of assigned requests.
    #[error("{worker} already holds {limit} assigned requests")]
    CapacityReached { worker: AccountId, limit: usize },

    /// No request with this id exists.
    #[error("request not found: {0}")]
    RequestNotFound(RequestId),

    /// The verifier holds no assignment for this request.
    #[error("{verifier} is not assigned to request {request_id}")]
    NotAssigned { request_id: RequestId, verifier: AccountId },

    /// The owner has no stake left to slash.
    #[error("nothing to slash for {0}")]
    NothingToSlash(AccountId),

    /// The worker has no payable or pending rewards.
    #[error("nothing to claim for {0}")]
    NothingToClaim(AccountId),

    /// The stake backs work that is still assigned or awaiting verification.
    #[error("stake of {owner} is locked by {outstanding} outstanding requests")]
    StakeLocked { owner: AccountId, outstanding: usize },

    /// A zero or otherwise unusable amount was supplied.
    #[error("invalid amount: {0}")]
    InvalidAmount(Amount),

    /// The token ledger rejected a transfer.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A configuration update failed validation.
    #[error(transparent)]
    Config(#[from] CoreError),
}
