//! Post-operation view returned after a transaction is applied.

use serde::Serialize;

use crate::model::{Account, AccountId, Transaction};
use crate::stores::{AccountStore, TransactionLedger};
use crate::Result;

/// An account together with its transaction history, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountActivity {
    pub account: Account,
    pub transactions: Vec<Transaction>,
}

/// Re-reads an account and its history. Never writes.
#[derive(Debug, Clone)]
pub struct ResponseComposer {
    accounts: AccountStore,
    ledger: TransactionLedger,
}

impl ResponseComposer {
    pub fn new(accounts: AccountStore, ledger: TransactionLedger) -> Self {
        Self { accounts, ledger }
    }

    pub fn compose(&self, account_id: AccountId) -> Result<AccountActivity> {
        let account = self.accounts.get(account_id)?;
        let transactions = self.ledger.list_by_account(&account_id.to_string())?;
        Ok(AccountActivity {
            account,
            transactions,
        })
    }
}
