//! A small banking service built on the repository.
//!
//! Each operation declares its transaction attribute; nested calls join the
//! caller's transaction, so a failed transfer rolls back its deposit too.

use lodestore_core::{CoreError, Repository, TransactionAttribute, TransactionContext};
use thiserror::Error;
use tracing::debug;

use crate::entities::Account;

/// Errors returned by [`Bank`].
#[derive(Debug, Error)]
pub enum BankError {
    /// The source account cannot cover the withdrawal.
    #[error("insufficient funds in {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Account id.
        account: String,
        /// Current balance.
        balance: i64,
        /// Amount requested.
        requested: i64,
    },

    /// No account with the id exists.
    #[error("unknown account {0}")]
    UnknownAccount(String),

    /// Storage or transaction failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Account operations with declared transaction boundaries.
#[derive(Debug, Clone)]
pub struct Bank {
    repo: Repository,
}

impl Bank {
    /// Creates a bank over `repo`.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Creates or replaces an account.
    pub fn open_account(
        &self,
        ctx: &mut TransactionContext,
        account: &Account,
    ) -> Result<(), BankError> {
        self.repo
            .transaction(ctx, TransactionAttribute::RequiredWrite, |ctx| {
                self.repo.put(ctx, account).map_err(BankError::from)
            })
    }

    /// Loads an account.
    pub fn account(&self, ctx: &mut TransactionContext, id: &str) -> Result<Account, BankError> {
        self.repo
            .transaction(ctx, TransactionAttribute::RequiredRead, |ctx| {
                self.repo
                    .get::<Account>(ctx, id)?
                    .ok_or_else(|| BankError::UnknownAccount(id.to_string()))
            })
    }

    /// Current balance of an account.
    pub fn balance(&self, ctx: &mut TransactionContext, id: &str) -> Result<i64, BankError> {
        Ok(self.account(ctx, id)?.balance)
    }

    /// Adds `amount` to an account.
    pub fn deposit(
        &self,
        ctx: &mut TransactionContext,
        id: &str,
        amount: i64,
    ) -> Result<Account, BankError> {
        self.repo
            .transaction(ctx, TransactionAttribute::RequiredWrite, |ctx| {
                let account = self.account(ctx, id)?;
                let updated = account.with_balance(account.balance + amount);
                self.repo.put(ctx, &updated)?;
                Ok(updated)
            })
    }

    /// Removes `amount` from an account.
    ///
    /// # Errors
    ///
    /// `InsufficientFunds` if the balance would go negative.
    pub fn withdraw(
        &self,
        ctx: &mut TransactionContext,
        id: &str,
        amount: i64,
    ) -> Result<Account, BankError> {
        self.repo
            .transaction(ctx, TransactionAttribute::RequiredWrite, |ctx| {
                let account = self.account(ctx, id)?;
                if account.balance < amount {
                    return Err(BankError::InsufficientFunds {
                        account: account.id,
                        balance: account.balance,
                        requested: amount,
                    });
                }
                let updated = account.with_balance(account.balance - amount);
                self.repo.put(ctx, &updated)?;
                Ok(updated)
            })
    }

    /// Moves `amount` between accounts atomically.
    ///
    /// The deposit runs first; if the withdrawal then fails, the whole
    /// transfer is rolled back.
    pub fn transfer(
        &self,
        ctx: &mut TransactionContext,
        from: &str,
        to: &str,
        amount: i64,
    ) -> Result<(), BankError> {
        self.repo
            .transaction(ctx, TransactionAttribute::RequiredWrite, |ctx| {
                self.deposit(ctx, to, amount)?;
                self.withdraw(ctx, from, amount)?;
                debug!(from, to, amount, "transferred");
                Ok(())
            })
    }

    /// Sum of all balances, read from a fresh snapshot independent of any
    /// transaction on `ctx`.
    pub fn audit_total(&self, ctx: &mut TransactionContext) -> Result<i64, BankError> {
        self.repo
            .transaction(ctx, TransactionAttribute::RequiresNewRead, |ctx| {
                let accounts = self.repo.query::<Account>(ctx, "")?;
                Ok(accounts.iter().map(|a| a.balance).sum())
            })
    }
}
