//! Shared fixtures for the marketplace integration tests.

#![allow(dead_code)]

use warden_core::{AccountId, Amount, AuditOutcome, MarketConfig, RequestId};
use warden_engine::{InMemoryLedger, ManualClock, Marketplace, MemoryEventSink, TokenLedger};

pub type Market = Marketplace<InMemoryLedger, ManualClock, MemoryEventSink>;

pub fn account(name: &str) -> AccountId {
    AccountId::new(name)
}

pub fn requestor() -> AccountId {
    account("requestor")
}

pub fn market_with(config: MarketConfig) -> Market {
    let ledger = InMemoryLedger::new(account("escrow"));
    match Marketplace::new(ledger, ManualClock::new(1), MemoryEventSink::new(), account("police-sink"), config) {
        Ok(m) => m,
        Err(e) => panic!("marketplace construction failed: {e}"),
    }
}

pub fn market() -> Market {
    market_with(MarketConfig::default())
}

/// Mint `amount` to `owner` and approve the escrow to pull all of it.
pub async fn fund(market: &Market, owner: &AccountId, amount: u128) {
    let amount = Amount::new(amount);
    if let Err(e) = market.ledger().mint(owner, amount) {
        panic!("mint failed: {e}");
    }
    let escrow = market.escrow().clone();
    if let Err(e) = market.ledger().approve(owner, &escrow, amount).await {
        panic!("approve failed: {e}");
    }
}

/// A worker holding exactly `amount` of stake.
pub async fn staked_worker(market: &Market, name: &str, amount: u128) -> AccountId {
    let worker = account(name);
    fund(market, &worker, amount).await;
    if let Err(e) = market.stake(&worker, Amount::new(amount)).await {
        panic!("stake failed: {e}");
    }
    worker
}

pub async fn submit(market: &Market, price: u128) -> RequestId {
    match market.submit_request(&requestor(), Amount::new(price), "ipfs://contract").await {
        Ok(id) => id,
        Err(e) => panic!("submit_request failed: {e}"),
    }
}

/// Queue a request, have `worker` take it and report it completed.
pub async fn complete(market: &Market, worker: &AccountId, price: u128) -> RequestId {
    let id = submit(market, price).await;
    match market.request_next(worker).await {
        Ok(Some(request)) => assert_eq!(request.id, id),
        other => panic!("expected request {id}, got {other:?}"),
    }
    if let Err(e) = market.submit_result(worker, id, AuditOutcome::Completed, b"report").await {
        panic!("submit_result failed: {e}");
    }
    id
}

pub async fn balance(market: &Market, owner: &AccountId) -> Amount {
    market.ledger().balance_of(owner).await
}
