//! Deflationary Token Ledger
//!
//! Fungible token ledger whose transfers burn a small tax, permanently
//! shrinking total supply.
//!
//! # Architecture
//!
//! - **Staged Commits**: Every mutation stages its writes, then commits all or nothing
//! - **Single Writer**: One actor task owns the ledger and serializes mutations
//! - **Hash-Chained Journal**: Each event digest covers its predecessor
//! - **Optional Persistence**: RocksDB column families written in one batch
//!
//! # Invariants
//!
//! - Supply conservation: Σ(balances) == total supply after every operation
//! - Monotone supply: total supply never increases after issuance
//! - Atomicity: a rejected operation changes nothing and emits nothing
//! - Append-only: events are never modified or deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod ledger;
pub mod math;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use actor::{spawn_ledger_actor, LedgerHandle};
pub use config::Config;
pub use error::{Error, Result};
pub use events::EventLog;
pub use ledger::{TokenLedger, TAX_DIVISOR};
pub use metrics::Metrics;
pub use types::{
    AccountId, Amount, BatchReport, EntryOutcome, EventRecord, TokenEvent, TokenMetadata,
};
