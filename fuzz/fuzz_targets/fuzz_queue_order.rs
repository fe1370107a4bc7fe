//! Fuzz target: `RequestQueue` pop order against a sorted reference.
//!
//! Each input pair is (price, floor). Prices are pushed in order; then the
//! queue is drained at each floor and must yield the same sequence as a
//! stable sort by descending price.

#![no_main]

use libfuzzer_sys::fuzz_target;
use warden_core::{Amount, RequestId};
use warden_engine::RequestQueue;

fuzz_target!(|data: &[u8]| {
    let mut queue = RequestQueue::new();
    let mut reference: Vec<(u8, u64)> = Vec::new();
    for (i, price) in data.iter().enumerate() {
        let id = i as u64 + 1;
        queue.push(Amount::new(u128::from(*price)), RequestId::new(id));
        reference.push((*price, id));
    }
    assert_eq!(queue.len(), reference.len());

    let floor = data.first().copied().unwrap_or(0) / 2;
    let mut expected: Vec<(u8, u64)> = reference.iter().copied().filter(|(p, _)| *p >= floor).collect();
    expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    for (price, id) in expected {
        let popped = queue.pop_eligible(Amount::new(u128::from(floor)));
        assert_eq!(popped, Some((Amount::new(u128::from(price)), RequestId::new(id))));
    }
    assert_eq!(queue.pop_eligible(Amount::new(u128::from(floor))), None);
    assert!(!queue.has_eligible(Amount::new(u128::from(floor))));
});
