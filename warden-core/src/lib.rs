//! Core types for the Warden staked audit marketplace.
//!
//! Defines the shared domain vocabulary: identities, amounts, audit
//! requests and their lifecycle, police assignments and reports, and the
//! marketplace configuration.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod amount;
pub mod config;
pub mod error;
pub mod id;
pub mod request;
pub mod verification;

pub use amount::{Amount, Height};
pub use config::{MarketConfig, SlashBasis};
pub use error::CoreError;
pub use id::{AccountId, ContentHash, RequestId};
pub use request::{AuditOutcome, AuditRequest, RequestState};
pub use verification::{PoliceAssignment, PoliceReport, VerificationState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_increase() {
        let first = RequestId::FIRST;
        assert_eq!(first.get(), 1);
        assert!(first.next() > first);
        assert_eq!(first.next().to_string(), "#2");
    }

    #[test]
    fn content_hash_of_empty_payload_is_sha256_of_empty() {
        let hash = ContentHash::digest(b"");
        assert_eq!(
            hash.to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "empty payload hash must match known SHA-256 value"
        );
    }

    #[test]
    fn content_hash_differs_for_different_payloads() {
        assert_ne!(ContentHash::digest(b"report-a"), ContentHash::digest(b"report-b"));
    }

    #[test]
    fn amount_percent_floors() {
        assert_eq!(Amount::new(10_000).percent(20), Amount::new(2_000));
        assert_eq!(Amount::new(199).percent(50), Amount::new(99));
        assert_eq!(Amount::new(7).percent(0), Amount::ZERO);
        assert_eq!(Amount::new(u128::MAX).percent(100), Amount::new(u128::MAX));
    }

    #[test]
    fn amount_checked_arithmetic() {
        assert_eq!(Amount::new(5).checked_sub(Amount::new(6)), None);
        assert_eq!(Amount::new(u128::MAX).checked_add(Amount::new(1)), None);
        assert_eq!(Amount::new(5).saturating_sub(Amount::new(6)), Amount::ZERO);
    }

    #[test]
    fn new_request_is_queued_and_unpaid() {
        let request = AuditRequest::new(
            RequestId::FIRST,
            AccountId::new("requestor"),
            Amount::new(123),
            "ipfs://contract.sol",
            7,
        );
        assert_eq!(request.state, RequestState::Queued);
        assert_eq!(request.submitted_at, 7);
        assert!(request.assigned_worker.is_none());
        assert!(!request.reward_paid);
        assert!(!request.is_assigned_to(&AccountId::new("worker")));
    }

    #[test]
    fn audit_outcome_maps_to_state() {
        assert_eq!(AuditOutcome::Completed.state(), RequestState::Completed);
        assert_eq!(AuditOutcome::Error.state(), RequestState::Error);
    }

    #[test]
    fn only_valid_and_expired_are_payable() {
        assert!(VerificationState::Valid.is_payable());
        assert!(VerificationState::Expired.is_payable());
        assert!(!VerificationState::Invalid.is_payable());
        assert!(!VerificationState::Unverified.is_payable());
    }

    #[test]
    fn police_assignment_expires_after_window() {
        let assignment = PoliceAssignment::new(RequestId::FIRST, AccountId::new("p1"), 10, 25);
        assert!(!assignment.is_expired(25), "last height of the window is still open");
        assert!(assignment.is_expired(26));
    }

    #[test]
    fn police_report_hashes_payload() {
        let report = PoliceReport::new(b"looks fine".to_vec(), true, 3);
        assert_eq!(report.digest, ContentHash::digest(b"looks fine"));
    }

    #[test]
    fn amount_serializes_transparently() {
        let json = match serde_json::to_string(&Amount::new(42)) {
            Ok(s) => s,
            Err(e) => panic!("serialization failed: {e}"),
        };
        assert_eq!(json, "42");
    }
}
