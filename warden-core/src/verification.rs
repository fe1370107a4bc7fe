use serde::{Deserialize, Serialize};

use crate::amount::Height;
use crate::id::{AccountId, ContentHash, RequestId};

/// Verification state of a completed request.
///
/// `Invalid` is terminal. `Valid` may still fall to `Invalid`. `Expired` is
/// reached only from `Unverified` once the submission window has passed and
/// someone settles the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum VerificationState {
    /// No verdict yet.
    #[default]
    Unverified,
    /// A verifier confirmed the result.
    Valid,
    /// A verifier rejected the result; the worker was slashed.
    Invalid,
    /// The window closed without any verdict. Payable.
    Expired,
}

impl VerificationState {
    /// Whether a request in this state may be paid out.
    #[must_use]
    pub const fn is_payable(self) -> bool {
        matches!(self, Self::Valid | Self::Expired)
    }
}

/// A verifier's duty to check one completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct PoliceAssignment {
    /// The request to check.
    pub request_id: RequestId,
    /// The verifier on duty.
    pub verifier: AccountId,
    /// Height at which the assignment was made.
    pub assigned_at: Height,
    /// Last height at which a report is accepted.
    pub window_ends_at: Height,
}

impl PoliceAssignment {
    /// Creates an assignment.
    #[must_use]
    pub fn new(
        request_id: RequestId,
        verifier: AccountId,
        assigned_at: Height,
        window_ends_at: Height,
    ) -> Self {
        Self { request_id, verifier, assigned_at, window_ends_at }
    }

    /// Returns `true` once `height` lies past the submission window.
    #[must_use]
    pub fn is_expired(&self, height: Height) -> bool {
        height > self.window_ends_at
    }
}

/// A verifier's report on a completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct PoliceReport {
    /// Raw report payload.
    pub payload: Vec<u8>,
    /// SHA-256 of `payload`.
    pub digest: ContentHash,
    /// The verifier's verdict.
    pub is_valid: bool,
    /// Height at which the report was accepted.
    pub submitted_at: Height,
}

impl PoliceReport {
    /// Creates a report, hashing its payload.
    #[must_use]
    pub fn new(payload: Vec<u8>, is_valid: bool, submitted_at: Height) -> Self {
        let digest = ContentHash::digest(&payload);
        Self { payload, digest, is_valid, submitted_at }
    }
}
