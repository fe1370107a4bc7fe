//! Escrowed worker stakes and slashing.
//!
//! Balances here mirror tokens the marketplace escrow account holds on the
//! [`TokenLedger`](crate::ledger::TokenLedger); moving the tokens themselves
//! is the caller's job.

use std::collections::HashMap;

use warden_core::{AccountId, Amount, MarketConfig};

use crate::error::MarketError;

/// Stake balances by owner. Never negative.
#[derive(Debug, Clone, Default)]
pub struct StakeLedger {
    deposits: HashMap<AccountId, Amount>,
}

impl StakeLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `owner`'s stake and return the new balance.
    ///
    /// # Errors
    /// Returns [`MarketError::InvalidAmount`] for a zero amount or on overflow.
    pub fn deposit(&mut self, owner: &AccountId, amount: Amount) -> Result<Amount, MarketError> {
        if amount.is_zero() {
            return Err(MarketError::InvalidAmount(amount));
        }
        let balance = self
            .balance_of(owner)
            .checked_add(amount)
            .ok_or(MarketError::InvalidAmount(amount))?;
        self.deposits.insert(owner.clone(), balance);
        Ok(balance)
    }

    /// Current stake of `owner`.
    #[must_use]
    pub fn balance_of(&self, owner: &AccountId) -> Amount {
        self.deposits.get(owner).copied().unwrap_or_default()
    }

    /// Whether `owner` meets the minimum stake.
    #[must_use]
    pub fn has_minimum(&self, owner: &AccountId, min_stake: Amount) -> bool {
        self.balance_of(owner) >= min_stake
    }

    /// Seize one slash worth of `owner`'s stake and return the amount taken.
    ///
    /// The proportional amount is capped at the remaining balance, so a
    /// depleted stake is emptied rather than driven negative.
    ///
    /// # Errors
    /// Returns [`MarketError::NothingToSlash`] if the balance is already zero
    /// or the computed slash rounds to zero.
    pub fn slash(&mut self, owner: &AccountId, config: &MarketConfig) -> Result<Amount, MarketError> {
        let balance = self.balance_of(owner);
        let amount = config.slash_amount(balance);
        if amount.is_zero() {
            return Err(MarketError::NothingToSlash(owner.clone()));
        }
        self.deposits.insert(owner.clone(), balance.saturating_sub(amount));
        Ok(amount)
    }

    /// Empty `owner`'s stake and return what it held.
    ///
    /// # Errors
    /// Returns [`MarketError::InvalidAmount`] if there is nothing to withdraw.
    pub fn withdraw_all(&mut self, owner: &AccountId) -> Result<Amount, MarketError> {
        match self.deposits.remove(owner) {
            Some(balance) if !balance.is_zero() => Ok(balance),
            _ => Err(MarketError::InvalidAmount(Amount::ZERO)),
        }
    }

    /// Reset `owner`'s stake to `balance`, undoing a deposit, slash or withdrawal.
    pub fn restore(&mut self, owner: &AccountId, balance: Amount) {
        if balance.is_zero() {
            self.deposits.remove(owner);
        } else {
            self.deposits.insert(owner.clone(), balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use warden_core::SlashBasis;

    use super::*;

    fn auditor() -> AccountId {
        AccountId::new("auditor")
    }

    fn staked(amount: u128) -> StakeLedger {
        let mut ledger = StakeLedger::new();
        if let Err(e) = ledger.deposit(&auditor(), Amount::new(amount)) {
            panic!("deposit failed: {e}");
        }
        ledger
    }

    #[test]
    fn deposit_accumulates_and_gates_minimum() {
        let mut ledger = staked(6_000);
        assert!(!ledger.has_minimum(&auditor(), Amount::new(10_000)));
        assert!(ledger.deposit(&auditor(), Amount::new(4_000)).is_ok());
        assert!(ledger.has_minimum(&auditor(), Amount::new(10_000)));
    }

    #[test]
    fn zero_deposit_rejects() {
        let mut ledger = StakeLedger::new();
        assert!(matches!(
            ledger.deposit(&auditor(), Amount::ZERO),
            Err(MarketError::InvalidAmount(_))
        ));
    }

    #[test]
    fn repeated_slashes_cap_at_remaining_balance() {
        let config = MarketConfig::default();
        let mut ledger = staked(11_000);
        let mut taken = Vec::new();
        for _ in 0..6 {
            match ledger.slash(&auditor(), &config) {
                Ok(amount) => taken.push(amount.units()),
                Err(e) => panic!("slash failed: {e}"),
            }
        }
        assert_eq!(taken, [2_000, 2_000, 2_000, 2_000, 2_000, 1_000]);
        assert_eq!(ledger.balance_of(&auditor()), Amount::ZERO);
        assert!(matches!(
            ledger.slash(&auditor(), &config),
            Err(MarketError::NothingToSlash(_))
        ));
    }

    #[test]
    fn balance_basis_slashes_proportionally() {
        let config = MarketConfig {
            slash_basis: SlashBasis::CurrentBalance,
            slash_percentage: 50,
            ..MarketConfig::default()
        };
        let mut ledger = staked(1_000);
        assert!(matches!(ledger.slash(&auditor(), &config), Ok(a) if a == Amount::new(500)));
        assert!(matches!(ledger.slash(&auditor(), &config), Ok(a) if a == Amount::new(250)));
        assert_eq!(ledger.balance_of(&auditor()), Amount::new(250));
    }

    #[test]
    fn withdraw_all_empties_stake() {
        let mut ledger = staked(500);
        assert!(matches!(ledger.withdraw_all(&auditor()), Ok(a) if a == Amount::new(500)));
        assert_eq!(ledger.balance_of(&auditor()), Amount::ZERO);
        assert!(ledger.withdraw_all(&auditor()).is_err());
    }

    #[test]
    fn restore_undoes_a_slash() {
        let mut ledger = staked(10_000);
        assert!(ledger.slash(&auditor(), &MarketConfig::default()).is_ok());
        ledger.restore(&auditor(), Amount::new(10_000));
        assert_eq!(ledger.balance_of(&auditor()), Amount::new(10_000));
        ledger.restore(&auditor(), Amount::ZERO);
        assert!(ledger.withdraw_all(&auditor()).is_err());
    }
}
