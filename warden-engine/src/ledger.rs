//! Token ledger abstraction.
//!
//! The marketplace never holds balances itself: request prices, stakes,
//! payouts and slashes all move through a [`TokenLedger`]. The handle is bound
//! to the marketplace's escrow account, which is the spender in
//! `transfer_from` and the source in `transfer`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use warden_core::{AccountId, Amount};

/// Errors reported by a token ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The source account does not hold enough tokens.
    #[error("insufficient balance on {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        account: AccountId,
        needed: Amount,
        available: Amount,
    },

    /// The owner has not approved the spender for enough tokens.
    #[error("insufficient allowance from {owner} to {spender}: needed {needed}, approved {approved}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        needed: Amount,
        approved: Amount,
    },

    /// Crediting the destination would overflow.
    #[error("balance overflow on {0}")]
    Overflow(AccountId),

    /// The ledger refused the call for its own reasons.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Fungible-token ledger used for escrow, payouts and slashing.
///
/// Implementations must be `Send + Sync` so a marketplace can be shared
/// across tasks. Any error is treated by the caller as a fatal abort of the
/// surrounding operation.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// The account this handle spends from.
    fn holder(&self) -> &AccountId;

    /// Move `amount` from `from` to `to`, spending the holder's allowance.
    ///
    /// # Errors
    /// Returns [`LedgerError::InsufficientAllowance`] or
    /// [`LedgerError::InsufficientBalance`] if the transfer cannot be covered.
    async fn transfer_from(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    /// Move `amount` from the holder to `to`.
    ///
    /// # Errors
    /// Returns [`LedgerError::InsufficientBalance`] if the holder cannot cover it.
    async fn transfer(&self, to: &AccountId, amount: Amount) -> Result<(), LedgerError>;

    /// Current balance of `account`.
    async fn balance_of(&self, account: &AccountId) -> Amount;

    /// Let `spender` move up to `amount` of `owner`'s tokens.
    ///
    /// # Errors
    /// Implementation specific; the in-memory ledger never fails here.
    async fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    /// Remaining amount `spender` may move on behalf of `owner`.
    async fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount;
}

#[derive(Debug, Default)]
struct Books {
    balances: HashMap<AccountId, Amount>,
    allowances: HashMap<(AccountId, AccountId), Amount>,
}

impl Books {
    fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn move_tokens(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let available = self.balance(from);
        let debited = available.checked_sub(amount).ok_or_else(|| {
            LedgerError::InsufficientBalance { account: from.clone(), needed: amount, available }
        })?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(to.clone()))?;
        self.balances.insert(from.clone(), debited);
        self.balances.insert(to.clone(), credited);
        Ok(())
    }
}

/// A process-local [`TokenLedger`].
///
/// Suitable for simulations and tests. Transfers can be halted to exercise
/// the caller's failure path.
#[derive(Debug)]
pub struct InMemoryLedger {
    holder: AccountId,
    books: Mutex<Books>,
    halted: AtomicBool,
}

impl InMemoryLedger {
    /// Create an empty ledger whose handle spends from `holder`.
    #[must_use]
    pub fn new(holder: AccountId) -> Self {
        Self { holder, books: Mutex::new(Books::default()), halted: AtomicBool::new(false) }
    }

    /// Credit `amount` out of thin air.
    ///
    /// # Errors
    /// Returns [`LedgerError::Overflow`] if the balance would overflow.
    ///
    /// # Panics
    /// Panics if the internal `Mutex` is poisoned.
    pub fn mint(&self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let mut books = self.lock();
        let credited = books
            .balance(account)
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(account.clone()))?;
        books.balances.insert(account.clone(), credited);
        Ok(())
    }

    /// Make every subsequent transfer fail with [`LedgerError::Rejected`].
    pub fn set_halted(&self, halted: bool) {
        self.halted.store(halted, Ordering::SeqCst);
    }

    fn check_halted(&self) -> Result<(), LedgerError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("ledger halted".to_owned()));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Books> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let books = self.books.lock().expect("ledger books lock poisoned");
        books
    }
}

#[async_trait]
impl TokenLedger for InMemoryLedger {
    fn holder(&self) -> &AccountId {
        &self.holder
    }

    async fn transfer_from(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.check_halted()?;
        let mut books = self.lock();
        let key = (from.clone(), self.holder.clone());
        let approved = books.allowances.get(&key).copied().unwrap_or_default();
        let remaining = approved.checked_sub(amount).ok_or_else(|| {
            LedgerError::InsufficientAllowance {
                owner: from.clone(),
                spender: self.holder.clone(),
                needed: amount,
                approved,
            }
        })?;
        books.move_tokens(from, to, amount)?;
        books.allowances.insert(key, remaining);
        Ok(())
    }

    async fn transfer(&self, to: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.check_halted()?;
        let holder = self.holder.clone();
        self.lock().move_tokens(&holder, to, amount)
    }

    async fn balance_of(&self, account: &AccountId) -> Amount {
        self.lock().balance(account)
    }

    async fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.lock().allowances.insert((owner.clone(), spender.clone()), amount);
        Ok(())
    }

    async fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.lock()
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_default()
    }
}
