//! Fuzz target: `VerifierRotator` under arbitrary membership churn.
//!
//! Opcodes add, remove or assign. Every assignment must pick distinct
//! active verifiers, as many as the active set allows.

#![no_main]

use std::collections::HashSet;

use libfuzzer_sys::fuzz_target;
use warden_core::{AccountId, RequestId};
use warden_engine::VerifierRotator;

fuzz_target!(|data: &[u8]| {
    let Some((&nodes, ops)) = data.split_first() else {
        return;
    };
    let mut rotator = VerifierRotator::new(usize::from(nodes % 5) + 1);
    let mut next_request = RequestId::FIRST;

    for (height, op) in ops.iter().enumerate() {
        let verifier = AccountId::new(format!("police{}", op % 8));
        match op >> 6 {
            0 => {
                rotator.add_verifier(verifier);
            }
            1 => {
                rotator.remove_verifier(&verifier);
            }
            _ => {
                let height = height as u64;
                let picked = rotator.assign(next_request, height, height + 10);
                let unique: HashSet<_> = picked.iter().collect();
                assert_eq!(unique.len(), picked.len());
                assert_eq!(picked.len(), rotator.nodes_per_report().min(rotator.len()));
                assert!(picked.iter().all(|v| rotator.is_active(v)));
                assert!(picked.iter().all(|v| rotator.is_assigned(next_request, v, height)));
                next_request = next_request.next();
            }
        }
    }
});
