//! Marketplace engine for Warden staked audits.
//!
//! Requestors escrow a price and queue audit requests; staked workers pull
//! the best-paying request they will accept, audit it and submit a result.
//! A rotating set of police verifiers checks completed work inside a fixed
//! window. Valid or unchallenged work is paid out of escrow; work found
//! invalid forfeits its payment and costs the worker part of its stake.
//!
//! [`Marketplace`] is the entry point. Token custody is behind
//! [`TokenLedger`], time behind [`Clock`], and notifications behind
//! [`EventSink`].

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod clock;
pub mod error;
pub mod events;
pub mod ledger;
pub mod market;
pub mod police;
pub mod queue;
pub mod requests;
pub mod rewards;
pub mod stake;
pub mod verification;
pub mod workers;

pub use clock::{Clock, ManualClock};
pub use error::MarketError;
pub use events::{EventSink, MarketEvent, MemoryEventSink, TracingEventSink};
pub use ledger::{InMemoryLedger, LedgerError, TokenLedger};
pub use market::{Availability, Marketplace};
pub use police::VerifierRotator;
pub use queue::RequestQueue;
pub use rewards::ClaimPlan;
pub use verification::{ReportOutcome, VerificationAggregator, VerificationRecord};
