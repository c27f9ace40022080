pub mod composer;
pub mod config;
pub mod db;
mod engine;
mod error;
pub mod http;
pub mod model;
mod stores;
pub mod telemetry;

pub use composer::{AccountActivity, ResponseComposer};
pub use engine::TransactionProcessor;
pub use error::{Error, ErrorKind, Result};
pub use model::{Account, AccountId, NewAccount, Transaction, TransactionId, TransactionType};
pub use stores::{AccountStore, TransactionLedger};
