//! Fuzz target: `MarketConfig` JSON parsing and validation.
//!
//! Arbitrary bytes must never panic the parser. A config that validates must
//! never slash more than the balance it is given.

#![no_main]

use libfuzzer_sys::fuzz_target;
use warden_core::{Amount, MarketConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(config) = serde_json::from_slice::<MarketConfig>(data) else {
        return;
    };
    if config.validate().is_err() {
        return;
    }
    for balance in [0u128, 1, 99, 10_000, u128::MAX] {
        let balance = Amount::new(balance);
        assert!(config.slash_amount(balance) <= balance);
    }
});
