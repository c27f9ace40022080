//! Domain-specific errors for the account ledger.
//!
//! Every variant belongs to exactly one [`ErrorKind`]. Callers that need to decide
//! how to react (the HTTP layer picking a status code, for example) match on the
//! kind, never on the message text.

use thiserror::Error;

use crate::db::StoreError;
use crate::model::TransactionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("invalid identifier: {0:?}")]
    InvalidReference(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("amount must be greater than 0")]
    AmountMustBePositive,
    #[error("amount is out of range")]
    AmountOutOfRange,
    #[error("invalid transaction type: {0:?}")]
    InvalidTransactionType(String),
    #[error("transaction type {0} is not supported")]
    UnsupportedTransactionType(TransactionType),
    #[error("balance cannot be negative")]
    NegativeBalance,
    #[error("account with this email already exists")]
    DuplicateEmail(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AccountNotFound(_) | Error::TransactionNotFound(_) => ErrorKind::NotFound,
            Error::InvalidReference(_)
            | Error::MissingField(_)
            | Error::AmountMustBePositive
            | Error::AmountOutOfRange
            | Error::InvalidTransactionType(_)
            | Error::UnsupportedTransactionType(_)
            | Error::NegativeBalance => ErrorKind::InvalidArgument,
            Error::DuplicateEmail(_) => ErrorKind::Conflict,
            Error::Store(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
