//! Hashing for the event journal
//!
//! Every committed event is chained to its predecessor:
//! `digest_n = SHA-256(digest_{n-1} || sequence_n || canonical(event_n))`.
//! The chain starts from [`GENESIS_DIGEST`].

use crate::{types::TokenEvent, Result};
use sha2::{Digest, Sha256};

/// Digest preceding the first journal record
pub const GENESIS_DIGEST: [u8; 32] = [0u8; 32];

/// Chain an event onto the previous digest
pub fn chain_digest(previous: &[u8; 32], sequence: u64, event: &TokenEvent) -> Result<[u8; 32]> {
    let canonical_bytes = event.canonical_bytes()?;

    let mut hasher = Sha256::new();
    hasher.update(previous);
    hasher.update(sequence.to_be_bytes());
    hasher.update(&canonical_bytes);
    Ok(hasher.finalize().into())
}

/// Render a digest as lowercase hex (for logs)
pub fn to_hex(digest: &[u8; 32]) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
