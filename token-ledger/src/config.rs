//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ledger::TAX_DIVISOR;
use crate::types::{AccountId, Amount, TokenMetadata};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Token issuance parameters
    pub token: TokenConfig,

    /// Transfer tax parameters
    pub tax: TaxConfig,

    /// RocksDB configuration
    pub storage: StorageConfig,

    /// Actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/token-ledger"),
            service_name: "token-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            token: TokenConfig::default(),
            tax: TaxConfig::default(),
            storage: StorageConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// Token issuance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token name
    pub name: String,

    /// Ticker symbol
    pub symbol: String,

    /// Display decimals
    pub decimals: u8,

    /// Supply credited to the issuer at construction
    pub initial_supply: u64,

    /// Account receiving the initial supply
    pub issuer: AccountId,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "Deflationary Token".to_string(),
            symbol: "DFL".to_string(),
            decimals: 0,
            initial_supply: 1_000_000,
            issuer: AccountId::new("0x00000000000000000000000000000000000000a1"),
        }
    }
}

impl TokenConfig {
    /// Metadata exposed through the read API
    pub fn metadata(&self) -> TokenMetadata {
        TokenMetadata {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
        }
    }
}

/// Transfer tax configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxConfig {
    /// Rounding unit and scale factor of the burn calculation
    pub base_percent: u64,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self { base_percent: 100 }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persist ledger state to RocksDB
    pub enabled: bool,

    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Bounded mailbox size (backpressure)
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(issuer) = std::env::var("LEDGER_ISSUER") {
            config.token.issuer = AccountId::new(issuer);
        }

        if let Ok(supply) = std::env::var("LEDGER_INITIAL_SUPPLY") {
            config.token.initial_supply = parse_env("LEDGER_INITIAL_SUPPLY", &supply)?;
        }

        if let Ok(base) = std::env::var("LEDGER_BASE_PERCENT") {
            config.tax.base_percent = parse_env("LEDGER_BASE_PERCENT", &base)?;
        }

        if let Ok(enabled) = std::env::var("LEDGER_STORAGE_ENABLED") {
            config.storage.enabled = parse_env("LEDGER_STORAGE_ENABLED", &enabled)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a valid ledger
    pub fn validate(&self) -> crate::Result<()> {
        if self.token.initial_supply == 0 {
            return Err(crate::Error::Config(
                "initial_supply must be non-zero".to_string(),
            ));
        }
        if self.token.issuer.is_null() {
            return Err(crate::Error::Config(
                "issuer must not be the null account".to_string(),
            ));
        }
        if self.tax.base_percent == 0 {
            return Err(crate::Error::Config(
                "base_percent must be non-zero".to_string(),
            ));
        }
        // Beyond this the burn on a 1-unit transfer exceeds the value moved
        let base = Amount::from(self.tax.base_percent);
        if base * base >= 2 * TAX_DIVISOR {
            return Err(crate::Error::Config(format!(
                "base_percent {} too large: base_percent^2 must stay below {}",
                base,
                2 * TAX_DIVISOR
            )));
        }
        if self
            .storage
            .write_buffer_size_mb
            .checked_mul(1024 * 1024)
            .is_none()
        {
            return Err(crate::Error::Config(format!(
                "write_buffer_size_mb too large: {}",
                self.storage.write_buffer_size_mb
            )));
        }
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value for {}: {}", name, value)))
}
