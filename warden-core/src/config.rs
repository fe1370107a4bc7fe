//! Marketplace parameters.

use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Height};
use crate::error::CoreError;

/// What a slash percentage is taken of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SlashBasis {
    /// A fixed fraction of the configured minimum stake. Repeated slashes
    /// eventually exceed the remaining balance and are capped by it.
    #[default]
    MinimumStake,
    /// A fraction of the owner's balance at the moment of the slash.
    CurrentBalance,
}

/// Tunable parameters of the marketplace.
///
/// Values are supplied by the host; this crate only validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Stake a worker must hold to receive work.
    pub min_stake: Amount,

    /// Percentage (`0..=100`) of the slash basis seized per negative verdict.
    pub slash_percentage: u8,

    /// What `slash_percentage` applies to.
    pub slash_basis: SlashBasis,

    /// Heights after completion during which police reports are accepted.
    pub police_timeout: Height,

    /// Verifiers assigned to each completed request.
    pub police_nodes_per_report: usize,

    /// Requests a worker may hold at once.
    pub max_assigned_requests: usize,

    /// Heights after assignment before a requestor may reclaim an unfinished request.
    pub audit_timeout: Height,
}

impl MarketConfig {
    /// Validates every field.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidSlashPercentage`] if `slash_percentage > 100`.
    /// Returns [`CoreError::InvalidConfig`] if `max_assigned_requests` or
    /// `police_nodes_per_report` is zero.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.slash_percentage > 100 {
            return Err(CoreError::InvalidSlashPercentage { value: self.slash_percentage });
        }
        if self.max_assigned_requests == 0 {
            return Err(CoreError::InvalidConfig {
                field: "max_assigned_requests".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.police_nodes_per_report == 0 {
            return Err(CoreError::InvalidConfig {
                field: "police_nodes_per_report".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// Amount seized from a stake of `balance` by one slash.
    ///
    /// Never exceeds `balance`.
    #[must_use]
    pub fn slash_amount(&self, balance: Amount) -> Amount {
        let base = match self.slash_basis {
            SlashBasis::MinimumStake => self.min_stake,
            SlashBasis::CurrentBalance => balance,
        };
        base.percent(self.slash_percentage).min(balance)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            min_stake: Amount::new(10_000),
            slash_percentage: 20,
            slash_basis: SlashBasis::MinimumStake,
            police_timeout: 15,
            police_nodes_per_report: 3,
            max_assigned_requests: 10,
            audit_timeout: 10,
        }
    }
}
