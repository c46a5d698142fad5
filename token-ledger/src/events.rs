//! Append-only event journal
//!
//! The ledger appends a [`TokenEvent`] record after every successful mutation.
//! [`EventLog`] is cheap to clone; clones share the same journal, so wallets,
//! explorers or tests can observe events without any way to write them.
//!
//! A journal backed by [`Storage`] keeps only its head in memory and reads
//! records from the `events` column family on demand. Without storage the
//! records stay resident.

use crate::{
    crypto::{chain_digest, GENESIS_DIGEST},
    storage::Storage,
    types::{EventRecord, TokenEvent},
    Error, Result,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;

/// Position and digest of the latest journal record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHead {
    /// Sequence of the latest record (0 when empty)
    pub sequence: u64,
    /// Digest of the latest record
    pub digest: [u8; 32],
}

impl JournalHead {
    /// Head of an empty journal
    pub fn genesis() -> Self {
        Self {
            sequence: 0,
            digest: GENESIS_DIGEST,
        }
    }
}

#[derive(Debug)]
struct Journal {
    head: JournalHead,
    // Empty when a store holds the records
    records: Vec<EventRecord>,
}

/// Shared, ordered, immutable event records
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<RwLock<Journal>>,
    store: Option<Arc<Storage>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Create an empty in-memory journal
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Journal {
                head: JournalHead::genesis(),
                records: Vec::new(),
            })),
            store: None,
        }
    }

    /// Journal whose records live in `store`, positioned at `head`
    pub fn persistent(store: Arc<Storage>, head: JournalHead) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Journal {
                head,
                records: Vec::new(),
            })),
            store: Some(store),
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.inner.read().head.sequence as usize
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.inner.read().head.sequence == 0
    }

    /// Digest of the latest record (genesis digest when empty)
    pub fn head_digest(&self) -> [u8; 32] {
        self.inner.read().head.digest
    }

    /// Sequence number of the latest record (0 when empty)
    pub fn last_sequence(&self) -> u64 {
        self.inner.read().head.sequence
    }

    /// All records, in order
    pub fn records(&self) -> Result<Vec<EventRecord>> {
        self.since(0)
    }

    /// The bare events, in order
    pub fn events(&self) -> Result<Vec<TokenEvent>> {
        Ok(self.records()?.into_iter().map(|r| r.event).collect())
    }

    /// Records with a sequence strictly greater than `sequence`
    pub fn since(&self, sequence: u64) -> Result<Vec<EventRecord>> {
        let mut tail = Vec::new();
        self.scan(sequence, |record| {
            tail.push(record);
            Ok(())
        })?;
        Ok(tail)
    }

    /// Recompute the hash chain over every record
    pub fn verify_chain(&self) -> Result<()> {
        let expected = self.inner.read().head;
        let mut cursor = ChainCursor::new();
        self.scan(0, |record| cursor.check(&record))?;

        if cursor.head != expected {
            return Err(Error::InvariantViolation(format!(
                "journal head at sequence {} does not match last record at {}",
                expected.sequence, cursor.head.sequence
            )));
        }
        Ok(())
    }

    /// Visit committed records after `sequence` without collecting them
    fn scan(
        &self,
        sequence: u64,
        mut visit: impl FnMut(EventRecord) -> Result<()>,
    ) -> Result<()> {
        let journal = self.inner.read();
        let last = journal.head.sequence;

        match &self.store {
            // Records past the head belong to a commit still in flight
            Some(store) => store.scan_events(sequence, |record| {
                if record.sequence > last {
                    return Ok(false);
                }
                visit(record)?;
                Ok(true)
            }),
            None => {
                for record in journal.records.iter().filter(|r| r.sequence > sequence) {
                    visit(record.clone())?;
                }
                Ok(())
            }
        }
    }

    /// Assign sequence numbers and digests without appending
    ///
    /// The caller must [`append`](Self::append) the result before preparing
    /// another batch; the ledger's single writer guarantees this.
    pub(crate) fn prepare(&self, events: Vec<TokenEvent>) -> Result<Vec<EventRecord>> {
        let head = self.inner.read().head;
        let mut previous = head.digest;
        let mut sequence = head.sequence;
        let recorded_at = Utc::now();

        let mut prepared = Vec::with_capacity(events.len());
        for event in events {
            sequence += 1;
            let digest = chain_digest(&previous, sequence, &event)?;
            previous = digest;
            prepared.push(EventRecord {
                sequence,
                event,
                recorded_at,
                digest,
            });
        }
        Ok(prepared)
    }

    /// Append prepared records
    pub(crate) fn append(&self, records: Vec<EventRecord>) {
        let mut journal = self.inner.write();
        if let Some(last) = records.last() {
            journal.head = JournalHead {
                sequence: last.sequence,
                digest: last.digest,
            };
        }
        if self.store.is_none() {
            journal.records.extend(records);
        }
    }

    #[cfg(test)]
    pub(crate) fn resident_len(&self) -> usize {
        self.inner.read().records.len()
    }
}

/// Incremental hash-chain check, one record at a time
struct ChainCursor {
    head: JournalHead,
}

impl ChainCursor {
    fn new() -> Self {
        Self {
            head: JournalHead::genesis(),
        }
    }

    fn check(&mut self, record: &EventRecord) -> Result<()> {
        let expected_sequence = self.head.sequence + 1;
        if record.sequence != expected_sequence {
            return Err(Error::InvariantViolation(format!(
                "journal gap: expected sequence {}, found {}",
                expected_sequence, record.sequence
            )));
        }
        let digest = chain_digest(&self.head.digest, record.sequence, &record.event)?;
        if digest != record.digest {
            return Err(Error::InvariantViolation(format!(
                "journal digest mismatch at sequence {}",
                record.sequence
            )));
        }
        self.head = JournalHead {
            sequence: record.sequence,
            digest,
        };
        Ok(())
    }
}
