//! Transaction processing: the only path that changes an account's balance.
//!
//! [`TransactionProcessor::apply`] validates a request, moves the balance and appends
//! the matching ledger entry while holding that account's lock.

use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::composer::{AccountActivity, ResponseComposer};
use crate::db::Database;
use crate::model::{AccountId, TransactionType};
use crate::stores::{AccountStore, TransactionLedger};
use crate::{Error, Result};

/// One mutex per account. Holding it serializes every balance change on that
/// account; different accounts never contend.
#[derive(Debug, Default)]
struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    fn for_account(&self, id: AccountId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }
}

/// Applies deposits and withdrawals so that an account's balance and its ledger
/// entries stay consistent.
///
/// The balance is written first and the ledger entry only after the balance write
/// succeeded, so a rejected operation never leaves a ledger entry behind. Both
/// writes happen while holding the account's lock, which makes the
/// read-compute-write of the balance safe under concurrent requests.
#[derive(Debug)]
pub struct TransactionProcessor {
    accounts: AccountStore,
    ledger: TransactionLedger,
    composer: ResponseComposer,
    locks: AccountLocks,
}

impl TransactionProcessor {
    pub fn new(db: &Database) -> Result<Self> {
        let accounts = AccountStore::new(db)?;
        let ledger = TransactionLedger::new(db)?;
        Ok(Self::with_stores(accounts, ledger))
    }

    pub fn with_stores(accounts: AccountStore, ledger: TransactionLedger) -> Self {
        let composer = ResponseComposer::new(accounts.clone(), ledger.clone());
        Self {
            accounts,
            ledger,
            composer,
            locks: AccountLocks::default(),
        }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    /// Applies `amount` of `transaction_type` to the account and returns the account
    /// with its full history as it stands afterwards.
    ///
    /// # Errors
    /// * `InvalidArgument` for an unknown or unsupported type, a non-positive amount,
    ///   a malformed account id or a withdrawal that would overdraw the account.
    ///   None of these write anything.
    /// * `NotFound` if the account does not exist.
    /// * `Internal` if the store fails. A failure of the ledger write after the
    ///   balance write is not compensated.
    pub fn apply(
        &self,
        account_id: &str,
        transaction_type: &str,
        amount: Decimal,
    ) -> Result<AccountActivity> {
        let transaction_type: TransactionType = transaction_type.parse()?;
        let delta = balance_delta(transaction_type, amount)?;
        let id = AccountId::parse(account_id)?;

        // Accounts are never deleted, so a lock is only ever created for an id that
        // exists.
        self.accounts.get(id)?;
        let lock = self.locks.for_account(id);
        let _guard = lock.lock();

        let account = self.accounts.get(id)?;
        let new_balance = account
            .balance
            .checked_add(delta)
            .ok_or(Error::AmountOutOfRange)?;

        if let Err(err) = self.accounts.update_balance(id, new_balance) {
            tracing::warn!(
                account_id = %id,
                kind = %transaction_type,
                amount = %amount,
                error = %err,
                "Transaction rejected"
            );
            return Err(err);
        }

        let transaction = self
            .ledger
            .append(transaction_type, amount, &id.to_string())
            .inspect_err(|err| {
                tracing::error!(
                    account_id = %id,
                    kind = %transaction_type,
                    amount = %amount,
                    error = %err,
                    "Balance updated but ledger append failed"
                );
            })?;

        tracing::info!(
            account_id = %id,
            transaction_id = %transaction.id,
            kind = %transaction_type,
            amount = %amount,
            balance = %new_balance,
            "Transaction applied"
        );
        self.composer.compose(id)
    }
}

fn balance_delta(transaction_type: TransactionType, amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(Error::AmountMustBePositive);
    }
    match transaction_type {
        TransactionType::Deposit => Ok(amount),
        TransactionType::Withdraw => Ok(-amount),
        TransactionType::Transfer => Err(Error::UnsupportedTransactionType(transaction_type)),
    }
}
