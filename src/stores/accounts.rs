use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::db::{Collection, Database, Filter, StoreError};
use crate::model::{Account, AccountId, NewAccount};
use crate::{Error, Result};

pub const COLLECTION: &str = "accounts";

/// Stored form of an [`Account`]. The balance is kept as decimal text so that no
/// digit is lost between writes.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRecord {
    id: AccountId,
    name: String,
    email: String,
    #[serde(with = "rust_decimal::serde::str")]
    balance: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountRecord {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            balance: account.balance,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            email: record.email,
            balance: record.balance,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Account records, unique by email.
#[derive(Debug, Clone)]
pub struct AccountStore {
    collection: Arc<Collection>,
}

impl AccountStore {
    /// Binds the store to `db` and makes sure the email uniqueness constraint exists.
    pub fn new(db: &Database) -> Result<Self> {
        let collection = db.collection(COLLECTION);
        collection.ensure_unique_index("email")?;
        Ok(Self { collection })
    }

    /// Fetches an account by its identifier as supplied by a caller.
    pub fn lookup(&self, id: &str) -> Result<Account> {
        let id = AccountId::parse(id)?;
        self.get(id)
    }

    pub fn get(&self, id: AccountId) -> Result<Account> {
        self.collection
            .find_one::<AccountRecord>(&id.to_string())?
            .map(Account::from)
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))
    }

    /// Creates an account. Uniqueness of `email` is enforced by the store's index in the
    /// same step as the insert, so concurrent creations cannot both succeed.
    pub fn create(&self, new: NewAccount) -> Result<Account> {
        let name = new.name.trim();
        let email = new.email.trim();
        if name.is_empty() {
            return Err(Error::MissingField("name"));
        }
        if email.is_empty() {
            return Err(Error::MissingField("email"));
        }
        if new.initial_balance < Decimal::ZERO {
            return Err(Error::NegativeBalance);
        }

        let now = Utc::now();
        let account = Account {
            id: AccountId::new(),
            name: name.to_string(),
            email: email.to_string(),
            balance: new.initial_balance,
            created_at: now,
            updated_at: now,
        };

        match self
            .collection
            .insert_one(&account.id.to_string(), &AccountRecord::from(&account))
        {
            Ok(()) => {
                tracing::info!(account_id = %account.id, "Account created");
                Ok(account)
            }
            Err(StoreError::DuplicateKey { field, .. }) if field == "email" => {
                tracing::warn!(email = %account.email, "Rejected duplicate account email");
                Err(Error::DuplicateEmail(account.email))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the stored balance with `new_balance` and refreshes `updatedAt`.
    /// The caller computes the final value; a negative value is rejected and nothing
    /// is written.
    pub fn update_balance(&self, id: AccountId, new_balance: Decimal) -> Result<()> {
        if new_balance < Decimal::ZERO {
            return Err(Error::NegativeBalance);
        }
        let updated_at = serde_json::to_value(Utc::now()).map_err(|source| StoreError::Encode {
            collection: COLLECTION.to_string(),
            source,
        })?;
        let balance = Value::String(new_balance.to_string());

        let found = self.collection.update_one(&id.to_string(), |doc| {
            doc.insert("balance".to_string(), balance);
            doc.insert("updatedAt".to_string(), updated_at);
        })?;
        if !found {
            return Err(Error::AccountNotFound(id.to_string()));
        }
        tracing::debug!(account_id = %id, balance = %new_balance, "Balance updated");
        Ok(())
    }

    /// All accounts, most recently created first. Empty when there are none.
    pub fn list_all(&self) -> Result<Vec<Account>> {
        let records: Vec<AccountRecord> = self.collection.find(Filter::All, "createdAt")?;
        Ok(records.into_iter().map(Account::from).collect())
    }
}
