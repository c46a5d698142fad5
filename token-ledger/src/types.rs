//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact integer arithmetic (no floating point for amounts)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

/// Token amount in base units
pub type Amount = u128;

/// Hex form of the null account
pub const NULL_ACCOUNT: &str = "0x0000000000000000000000000000000000000000";

/// Account identifier (address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The null account: source of issuance, sink of burns
    pub fn null() -> Self {
        Self(NULL_ACCOUNT.to_string())
    }

    /// Check for the null account
    pub fn is_null(&self) -> bool {
        self.0 == NULL_ACCOUNT
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::null()
    }
}

/// Read-only token metadata (display only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Token name
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
    /// Display decimals
    pub decimals: u8,
}

/// Observable ledger event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenEvent {
    /// Tokens moved. `from` is null for issuance, `to` is null for burns.
    Transfer {
        /// Source account
        from: AccountId,
        /// Destination account
        to: AccountId,
        /// Amount moved
        amount: Amount,
    },

    /// Allowance set to a new value
    Approval {
        /// Owner of the balance
        owner: AccountId,
        /// Spender allowed to move it
        spender: AccountId,
        /// Resulting allowance
        amount: Amount,
    },
}

impl TokenEvent {
    /// Create canonical bytes for hashing
    pub fn canonical_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// Event as recorded in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the journal, starting at 1
    pub sequence: u64,

    /// The event itself
    pub event: TokenEvent,

    /// Time the event was committed
    pub recorded_at: DateTime<Utc>,

    /// SHA-256 over the previous digest, sequence and event bytes
    pub digest: [u8; 32],
}

/// Result of a single entry of a batch transfer
#[derive(Debug)]
pub enum EntryOutcome {
    /// Transfer committed
    Committed,
    /// Transfer rejected; nothing from this entry was applied
    Rejected(Error),
    /// Entry never ran because an earlier one was rejected
    NotExecuted,
}

impl EntryOutcome {
    /// Check if this entry committed
    pub fn is_committed(&self) -> bool {
        matches!(self, EntryOutcome::Committed)
    }
}

/// Per-entry results of a batch transfer
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One outcome per (recipient, amount) pair, in input order
    pub outcomes: Vec<EntryOutcome>,
}

impl BatchReport {
    /// Number of entries that committed
    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_committed()).count()
    }

    /// True when every entry committed
    pub fn is_complete(&self) -> bool {
        self.committed() == self.outcomes.len()
    }

    /// Index and error of the rejected entry, if any
    pub fn first_rejection(&self) -> Option<(usize, &Error)> {
        self.outcomes.iter().enumerate().find_map(|(i, o)| match o {
            EntryOutcome::Rejected(err) => Some((i, err)),
            _ => None,
        })
    }
}
