//! Append-only ledger of transactions.
//!
//! Entries are written once by [`TransactionLedger::append`] and only ever read
//! afterwards; the ledger exposes no update or delete. Whether the referenced account
//! exists is the caller's concern.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::db::{Collection, Database, Filter};
use crate::model::{AccountId, Transaction, TransactionId, TransactionType};
use crate::{Error, Result};

pub const COLLECTION: &str = "transactions";

/// Stored form of a [`Transaction`], with the amount kept as exact decimal text.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRecord {
    id: TransactionId,
    transaction_type: TransactionType,
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
    account_id: AccountId,
    created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionRecord {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            account_id: tx.account_id,
            created_at: tx.created_at,
        }
    }
}

impl From<TransactionRecord> for Transaction {
    fn from(record: TransactionRecord) -> Self {
        Self {
            id: record.id,
            transaction_type: record.transaction_type,
            amount: record.amount,
            account_id: record.account_id,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionLedger {
    collection: Arc<Collection>,
}

impl TransactionLedger {
    /// Binds the ledger to `db` and indexes entries by account.
    pub fn new(db: &Database) -> Result<Self> {
        let collection = db.collection(COLLECTION);
        collection.ensure_index("accountId")?;
        Ok(Self { collection })
    }

    /// Records a new entry. Rejects non-positive amounts and malformed account ids
    /// before anything is written.
    pub fn append(
        &self,
        transaction_type: TransactionType,
        amount: Decimal,
        account_id: &str,
    ) -> Result<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(Error::AmountMustBePositive);
        }
        let account_id = AccountId::parse(account_id)?;

        let transaction = Transaction {
            id: TransactionId::new(),
            transaction_type,
            amount,
            account_id,
            created_at: Utc::now(),
        };
        self.collection
            .insert_one(&transaction.id.to_string(), &TransactionRecord::from(&transaction))?;
        tracing::debug!(
            transaction_id = %transaction.id,
            account_id = %account_id,
            kind = %transaction_type,
            amount = %amount,
            "Ledger entry appended"
        );
        Ok(transaction)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Transaction> {
        let id = TransactionId::parse(id)?;
        self.collection
            .find_one::<TransactionRecord>(&id.to_string())?
            .map(Transaction::from)
            .ok_or_else(|| Error::TransactionNotFound(id.to_string()))
    }

    /// Every entry, newest first.
    pub fn list_all(&self) -> Result<Vec<Transaction>> {
        let records: Vec<TransactionRecord> = self.collection.find(Filter::All, "createdAt")?;
        Ok(records.into_iter().map(Transaction::from).collect())
    }

    /// Entries for one account, newest first. Empty when the account has none.
    pub fn list_by_account(&self, account_id: &str) -> Result<Vec<Transaction>> {
        let account_id = Value::String(AccountId::parse(account_id)?.to_string());
        let records: Vec<TransactionRecord> = self
            .collection
            .find(Filter::Eq("accountId", &account_id), "createdAt")?;
        Ok(records.into_iter().map(Transaction::from).collect())
    }
}
