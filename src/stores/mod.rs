//! Storage layer for the ledger. Provides:
//! - Account records and balances ([`AccountStore`])
//! - The append-only transaction history ([`TransactionLedger`])
//!
//! Both are thin views over collections of a shared [`crate::db::Database`] handle.

mod accounts;
mod transactions;

pub use accounts::AccountStore;
pub use transactions::TransactionLedger;
