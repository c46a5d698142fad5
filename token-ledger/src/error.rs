//! Error types for the token ledger

use crate::types::Amount;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Checked addition or multiplication exceeded the amount range
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    /// Checked subtraction went below zero
    #[error("Arithmetic underflow")]
    ArithmeticUnderflow,

    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Account balance does not cover the requested amount
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance {
        /// Current balance
        have: Amount,
        /// Requested amount
        need: Amount,
    },

    /// Allowance does not cover the requested amount
    #[error("Insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance {
        /// Current allowance
        have: Amount,
        /// Requested amount
        need: Amount,
    },

    /// Target (recipient or spender) is the null account
    #[error("Invalid recipient: null account")]
    InvalidRecipient,

    /// Zero amount where a positive one is required (mint, burn)
    #[error("Invalid amount: must be non-zero")]
    InvalidAmount,

    /// Batch transfer with differently sized inputs
    #[error("Index mismatch: {recipients} recipients, {amounts} amounts")]
    IndexMismatch {
        /// Number of recipients supplied
        recipients: usize,
        /// Number of amounts supplied
        amounts: usize,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Invariant violation (supply conservation, journal chain)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ArithmeticOverflow => "arithmetic_overflow",
            Error::ArithmeticUnderflow => "arithmetic_underflow",
            Error::DivisionByZero => "division_by_zero",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::InsufficientAllowance { .. } => "insufficient_allowance",
            Error::InvalidRecipient => "invalid_recipient",
            Error::InvalidAmount => "invalid_amount",
            Error::IndexMismatch { .. } => "index_mismatch",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InsufficientBalance { have: 5, need: 6 };
        assert_eq!(err.to_string(), "Insufficient balance: have 5, need 6");

        let err = Error::IndexMismatch {
            recipients: 3,
            amounts: 2,
        };
        assert!(err.to_string().contains("3 recipients"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::InvalidAmount.kind(), "invalid_amount");
        assert_eq!(Error::Storage("x".into()).kind(), "storage");
    }
}
