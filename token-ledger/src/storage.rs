//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `balances` - Account balances (key: account id bytes)
//! - `allowances` - Allowances (key: len(owner) || owner || spender)
//! - `meta` - Total supply, tax base percent, token metadata, journal head
//! - `events` - Append-only event journal (key: sequence, big-endian)
//!
//! Every ledger mutation is written as one `WriteBatch`, so a crash never
//! leaves half an operation on disk.

use crate::{
    error::{Error, Result},
    events::JournalHead,
    ledger::Changeset,
    types::{AccountId, Amount, EventRecord, TokenMetadata},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use std::collections::HashMap;

/// Column family names
const CF_BALANCES: &str = "balances";
const CF_ALLOWANCES: &str = "allowances";
const CF_META: &str = "meta";
const CF_EVENTS: &str = "events";

/// Keys in the `meta` column family
const META_TOTAL_SUPPLY: &[u8] = b"total_supply";
const META_BASE_PERCENT: &[u8] = b"base_percent";
const META_METADATA: &[u8] = b"metadata";
const META_JOURNAL_HEAD: &[u8] = b"journal_head";

/// Full ledger state as loaded from disk
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    /// Token metadata
    pub metadata: TokenMetadata,
    /// Tax base percent fixed at issuance
    pub base_percent: Amount,
    /// Current total supply
    pub total_supply: Amount,
    /// Non-default balances
    pub balances: HashMap<AccountId, Amount>,
    /// Allowances keyed by (owner, spender)
    pub allowances: HashMap<(AccountId, AccountId), Amount>,
    /// Latest journal record; the records themselves stay on disk
    pub journal: JournalHead,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        let write_buffer_size = config
            .storage
            .write_buffer_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| {
                Error::Config(format!(
                    "write_buffer_size_mb too large: {}",
                    config.storage.write_buffer_size_mb
                ))
            })?;
        db_opts.set_write_buffer_size(write_buffer_size);
        db_opts.set_max_write_buffer_number(config.storage.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.storage.max_background_jobs);

        if config.storage.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_ALLOWANCES, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB ledger store");

        Ok(Self { db })
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // State is frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Write one operation's changes and journal records atomically
    pub(crate) fn write_changeset(
        &self,
        changes: &Changeset,
        records: &[EventRecord],
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_balances = self.cf_handle(CF_BALANCES)?;
        for (account, balance) in &changes.balances {
            batch.put_cf(cf_balances, account.as_str().as_bytes(), balance.to_be_bytes());
        }

        let cf_allowances = self.cf_handle(CF_ALLOWANCES)?;
        for ((owner, spender), amount) in &changes.allowances {
            batch.put_cf(
                cf_allowances,
                allowance_key(owner, spender)?,
                amount.to_be_bytes(),
            );
        }

        let cf_meta = self.cf_handle(CF_META)?;
        if let Some(total_supply) = changes.total_supply {
            batch.put_cf(cf_meta, META_TOTAL_SUPPLY, total_supply.to_be_bytes());
        }
        if let Some(genesis) = &changes.genesis {
            batch.put_cf(cf_meta, META_BASE_PERCENT, genesis.base_percent.to_be_bytes());
            batch.put_cf(cf_meta, META_METADATA, bincode::serialize(&genesis.metadata)?);
        }

        let cf_events = self.cf_handle(CF_EVENTS)?;
        for record in records {
            batch.put_cf(cf_events, record.sequence.to_be_bytes(), bincode::serialize(record)?);
        }
        if let Some(last) = records.last() {
            batch.put_cf(cf_meta, META_JOURNAL_HEAD, encode_journal_head(last));
        }

        self.db.write(batch)?;

        tracing::trace!(
            balances = changes.balances.len(),
            allowances = changes.allowances.len(),
            events = records.len(),
            "Changeset persisted"
        );

        Ok(())
    }

    /// Load the full ledger state, or `None` for a fresh store
    pub fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let cf_meta = self.cf_handle(CF_META)?;

        let total_supply = match self.db.get_cf(cf_meta, META_TOTAL_SUPPLY)? {
            Some(bytes) => decode_amount(&bytes)?,
            None => return Ok(None),
        };

        let base_percent = self
            .db
            .get_cf(cf_meta, META_BASE_PERCENT)?
            .ok_or_else(|| Error::Storage("base_percent missing".to_string()))
            .and_then(|bytes| decode_amount(&bytes))?;

        let metadata: TokenMetadata = match self.db.get_cf(cf_meta, META_METADATA)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Err(Error::Storage("token metadata missing".to_string())),
        };

        let mut balances = HashMap::new();
        for item in self.db.iterator_cf(self.cf_handle(CF_BALANCES)?, IteratorMode::Start) {
            let (key, value) = item?;
            balances.insert(decode_account(&key)?, decode_amount(&value)?);
        }

        let mut allowances = HashMap::new();
        for item in self
            .db
            .iterator_cf(self.cf_handle(CF_ALLOWANCES)?, IteratorMode::Start)
        {
            let (key, value) = item?;
            allowances.insert(decode_allowance_key(&key)?, decode_amount(&value)?);
        }

        let journal = match self.db.get_cf(cf_meta, META_JOURNAL_HEAD)? {
            Some(bytes) => decode_journal_head(&bytes)?,
            None => return Err(Error::Storage("journal head missing".to_string())),
        };
        self.check_journal_tail(&journal)?;

        Ok(Some(LedgerSnapshot {
            metadata,
            base_percent,
            total_supply,
            balances,
            allowances,
            journal,
        }))
    }

    /// Visit journal records after `sequence` in order until `visit` returns false
    pub(crate) fn scan_events(
        &self,
        sequence: u64,
        mut visit: impl FnMut(EventRecord) -> Result<bool>,
    ) -> Result<()> {
        let start = sequence.saturating_add(1).to_be_bytes();
        // Big-endian keys iterate in sequence order
        let iter = self.db.iterator_cf(
            self.cf_handle(CF_EVENTS)?,
            IteratorMode::From(&start[..], Direction::Forward),
        );
        for item in iter {
            let (_, value) = item?;
            if !visit(bincode::deserialize::<EventRecord>(&value)?)? {
                break;
            }
        }
        Ok(())
    }

    /// The last stored record must be the one the head points at
    fn check_journal_tail(&self, head: &JournalHead) -> Result<()> {
        let mut iter = self
            .db
            .iterator_cf(self.cf_handle(CF_EVENTS)?, IteratorMode::End);
        let last = match iter.next() {
            Some(item) => {
                let (_, value) = item?;
                Some(bincode::deserialize::<EventRecord>(&value)?)
            }
            None => None,
        };

        let consistent = match &last {
            Some(record) => record.sequence == head.sequence && record.digest == head.digest,
            None => head.sequence == 0,
        };
        if !consistent {
            return Err(Error::InvariantViolation(format!(
                "journal head at sequence {} does not match stored tail at {}",
                head.sequence,
                last.map(|r| r.sequence).unwrap_or(0)
            )));
        }
        Ok(())
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let accounts = self.approximate_count(self.cf_handle(CF_BALANCES)?)?;
        let allowances = self.approximate_count(self.cf_handle(CF_ALLOWANCES)?)?;
        let events = self.approximate_count(self.cf_handle(CF_EVENTS)?)?;

        Ok(StorageStats {
            accounts,
            allowances,
            events,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics (approximate)
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Accounts with a stored balance
    pub accounts: u64,
    /// Stored allowance pairs
    pub allowances: u64,
    /// Journal records
    pub events: u64,
}

fn allowance_key(owner: &AccountId, spender: &AccountId) -> Result<Vec<u8>> {
    let owner = owner.as_str().as_bytes();
    let len = u16::try_from(owner.len())
        .map_err(|_| Error::Storage("account id too long".to_string()))?;

    let mut key = Vec::with_capacity(2 + owner.len() + spender.as_str().len());
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(owner);
    key.extend_from_slice(spender.as_str().as_bytes());
    Ok(key)
}

fn decode_allowance_key(key: &[u8]) -> Result<(AccountId, AccountId)> {
    if key.len() < 2 {
        return Err(Error::Storage("allowance key too short".to_string()));
    }
    let len = u16::from_be_bytes([key[0], key[1]]) as usize;
    if key.len() < 2 + len {
        return Err(Error::Storage("allowance key truncated".to_string()));
    }
    let owner = decode_account(&key[2..2 + len])?;
    let spender = decode_account(&key[2 + len..])?;
    Ok((owner, spender))
}

fn decode_account(bytes: &[u8]) -> Result<AccountId> {
    std::str::from_utf8(bytes)
        .map(AccountId::new)
        .map_err(|e| Error::Storage(format!("invalid account id: {}", e)))
}

fn encode_journal_head(record: &EventRecord) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(40);
    bytes.extend_from_slice(&record.sequence.to_be_bytes());
    bytes.extend_from_slice(&record.digest);
    bytes
}

fn decode_journal_head(bytes: &[u8]) -> Result<JournalHead> {
    if bytes.len() != 40 {
        return Err(Error::Storage(format!(
            "invalid journal head width: {}",
            bytes.len()
        )));
    }
    let mut sequence = [0u8; 8];
    sequence.copy_from_slice(&bytes[..8]);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&bytes[8..]);
    Ok(JournalHead {
        sequence: u64::from_be_bytes(sequence),
        digest,
    })
}

fn decode_amount(bytes: &[u8]) -> Result<Amount> {
    let raw: [u8; 16] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("invalid amount width: {}", bytes.len())))?;
    Ok(Amount::from_be_bytes(raw))
}
