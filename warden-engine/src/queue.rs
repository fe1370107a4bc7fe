//! Price-bucketed FIFO queue of pending requests.
//!
//! Requests are grouped into one bucket per distinct price. Buckets are kept
//! in an ordered map and removed as soon as they empty, so the highest
//! populated price is always the last key and a pop never rescans buckets
//! it has already passed.

use std::collections::{BTreeMap, VecDeque};

use warden_core::{Amount, RequestId};

/// Pending requests ordered by price (descending) then age (ascending).
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    buckets: BTreeMap<Amount, VecDeque<RequestId>>,
    len: usize,
}

impl RequestQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` to the back of the bucket for `price`.
    ///
    /// # Complexity
    /// O(log b) where b is the number of distinct queued prices.
    pub fn push(&mut self, price: Amount, id: RequestId) {
        self.buckets.entry(price).or_default().push_back(id);
        self.len += 1;
    }

    /// Remove and return the oldest request of the highest price bucket,
    /// provided that price is at least `min_price`.
    ///
    /// Empty buckets never exist, so only the top bucket needs checking: if it
    /// sits below the floor, every other bucket does too.
    ///
    /// # Complexity
    /// O(log b).
    pub fn pop_eligible(&mut self, min_price: Amount) -> Option<(Amount, RequestId)> {
        let mut top = self.buckets.last_entry()?;
        let price = *top.key();
        if price < min_price {
            return None;
        }
        let id = top.get_mut().pop_front()?;
        if top.get().is_empty() {
            top.remove();
        }
        self.len -= 1;
        Some((price, id))
    }

    /// Put `id` back into the bucket for `price` at its age position.
    ///
    /// Ids are issued in submission order, so a bucket is always sorted by id
    /// and the slot is found by binary search. Re-queuing a request this way
    /// leaves it exactly where it was before it was taken out.
    ///
    /// # Complexity
    /// O(log b + k) where k is the size of that bucket.
    pub fn restore(&mut self, price: Amount, id: RequestId) {
        let bucket = self.buckets.entry(price).or_default();
        let slot = bucket.partition_point(|queued| *queued < id);
        bucket.insert(slot, id);
        self.len += 1;
    }

    /// Remove a specific request from the bucket for `price`.
    ///
    /// Returns `true` if it was queued. The bucket is searched from the back,
    /// so dropping the newest request is O(log b).
    ///
    /// # Complexity
    /// O(log b + k) where k is the size of that bucket.
    pub fn remove(&mut self, price: Amount, id: RequestId) -> bool {
        let Some(bucket) = self.buckets.get_mut(&price) else {
            return false;
        };
        let Some(pos) = bucket.iter().rposition(|queued| *queued == id) else {
            return false;
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(&price);
        }
        self.len -= 1;
        true
    }

    /// Highest price currently queued.
    #[must_use]
    pub fn max_price(&self) -> Option<Amount> {
        self.buckets.keys().next_back().copied()
    }

    /// Whether a pop at `min_price` would yield a request.
    #[must_use]
    pub fn has_eligible(&self, min_price: Amount) -> bool {
        self.max_price().is_some_and(|top| top >= min_price)
    }

    /// Total number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of non-empty price buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(prices: &[u128]) -> (RequestQueue, Vec<RequestId>) {
        let mut queue = RequestQueue::new();
        let ids: Vec<RequestId> = (1..=prices.len() as u64).map(RequestId::new).collect();
        for (price, id) in prices.iter().zip(&ids) {
            queue.push(Amount::new(*price), *id);
        }
        (queue, ids)
    }

    fn drain(queue: &mut RequestQueue, min_price: u128, n: usize) -> Vec<RequestId> {
        (0..n)
            .map_while(|_| queue.pop_eligible(Amount::new(min_price)).map(|(_, id)| id))
            .collect()
    }

    #[test]
    fn higher_price_pops_first() {
        let (mut queue, ids) = fill(&[124, 123]);
        assert_eq!(drain(&mut queue, 0, 2), [ids[0], ids[1]]);

        let (mut queue, ids) = fill(&[123, 124]);
        assert_eq!(drain(&mut queue, 0, 2), [ids[1], ids[0]]);
    }

    #[test]
    fn equal_price_pops_oldest_first() {
        let (mut queue, ids) = fill(&[123, 123]);
        assert_eq!(drain(&mut queue, 0, 2), [ids[0], ids[1]]);
    }

    #[test]
    fn emptied_bucket_is_removed_and_refilled() {
        let (mut queue, _) = fill(&[123, 123]);
        drain(&mut queue, 0, 2);
        assert!(queue.is_empty());
        assert_eq!(queue.bucket_count(), 0, "empty bucket must be dropped");

        queue.push(Amount::new(123), RequestId::new(10));
        queue.push(Amount::new(123), RequestId::new(11));
        assert_eq!(drain(&mut queue, 0, 2), [RequestId::new(10), RequestId::new(11)]);
    }

    #[test]
    fn price_floor_filters_and_lowering_drains_rest() {
        let (mut queue, ids) = fill(&[1, 123, 2, 124, 3, 123, 3, 1123]);
        assert_eq!(drain(&mut queue, 123, 8), [ids[7], ids[3], ids[1], ids[5]]);
        assert_eq!(queue.pop_eligible(Amount::new(123)), None);
        assert_eq!(queue.len(), 4);

        assert_eq!(drain(&mut queue, 3, 8), [ids[4], ids[6]]);
        assert_eq!(drain(&mut queue, 0, 8), [ids[2], ids[0]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn restore_returns_request_to_its_age_slot() {
        let (mut queue, ids) = fill(&[5, 5, 5]);
        assert!(queue.remove(Amount::new(5), ids[1]));
        queue.restore(Amount::new(5), ids[1]);
        assert_eq!(queue.len(), 3);
        assert_eq!(drain(&mut queue, 0, 3), [ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn restore_recreates_emptied_bucket() {
        let (mut queue, ids) = fill(&[9]);
        assert!(queue.remove(Amount::new(9), ids[0]));
        assert_eq!(queue.bucket_count(), 0);
        queue.restore(Amount::new(9), ids[0]);
        assert_eq!(queue.max_price(), Some(Amount::new(9)));
    }

    #[test]
    fn pop_on_empty_queue_returns_none() {
        let mut queue = RequestQueue::new();
        assert_eq!(queue.pop_eligible(Amount::ZERO), None);
        assert_eq!(queue.max_price(), None);
        assert!(!queue.has_eligible(Amount::ZERO));
    }

    #[test]
    fn remove_takes_request_out_of_its_bucket() {
        let (mut queue, ids) = fill(&[5, 5, 9]);
        assert!(queue.remove(Amount::new(9), ids[2]));
        assert!(!queue.remove(Amount::new(9), ids[2]), "second removal must miss");
        assert!(!queue.remove(Amount::new(7), ids[0]), "wrong price must miss");
        assert_eq!(queue.max_price(), Some(Amount::new(5)));
        assert!(queue.remove(Amount::new(5), ids[0]));
        assert_eq!(drain(&mut queue, 0, 3), [ids[1]]);
    }

    #[test]
    fn many_distinct_prices_pop_in_descending_order() {
        let prices: Vec<u128> = (1..=50).collect();
        let (mut queue, ids) = fill(&prices);
        let expected: Vec<RequestId> = ids.iter().rev().copied().collect();
        assert_eq!(drain(&mut queue, 0, 50), expected);
    }

    proptest::proptest! {
        #[test]
        fn proptest_pops_follow_price_desc_then_age(
            prices in proptest::collection::vec(0u128..20, 0..64usize),
        ) {
            let (mut queue, ids) = fill(&prices);
            let mut expected: Vec<(u128, RequestId)> =
                prices.iter().copied().zip(ids.iter().copied()).collect();
            expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            let expected: Vec<RequestId> = expected.into_iter().map(|(_, id)| id).collect();
            let popped = drain(&mut queue, 0, prices.len());
            proptest::prop_assert_eq!(popped, expected);
            proptest::prop_assert!(queue.is_empty());
        }

        #[test]
        fn proptest_floor_never_yields_cheaper_request(
            prices in proptest::collection::vec(0u128..50, 1..64usize),
            floor in 0u128..50,
        ) {
            let (mut queue, _) = fill(&prices);
            while let Some((price, _)) = queue.pop_eligible(Amount::new(floor)) {
                proptest::prop_assert!(price >= Amount::new(floor));
            }
            let below = prices.iter().filter(|p| **p < floor).count();
            proptest::prop_assert_eq!(queue.len(), below);
        }
    }
}
