//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `token_operations_total{operation, outcome}` - Mutations by result
//! - `token_burned_total` - Tokens destroyed by transfer tax and burns
//! - `token_total_supply` - Current total supply
//! - `token_operation_duration_seconds` - Histogram of mutation latencies

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::types::Amount;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Mutations by operation and outcome
    pub operations_total: IntCounterVec,

    /// Tokens burned
    pub burned_total: IntCounter,

    /// Current total supply
    pub total_supply: IntGauge,

    /// Mutation duration histogram
    pub operation_duration: Histogram,

    registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("burned_total", &self.burned_total.get())
            .field("total_supply", &self.total_supply.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("token_operations_total", "Ledger mutations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let burned_total = IntCounter::new("token_burned_total", "Tokens destroyed")?;
        registry.register(Box::new(burned_total.clone()))?;

        let total_supply = IntGauge::new("token_total_supply", "Current total supply")?;
        registry.register(Box::new(total_supply.clone()))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "token_operation_duration_seconds",
                "Histogram of mutation latencies",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            operations_total,
            burned_total,
            total_supply,
            operation_duration,
            registry,
        })
    }

    /// Record a completed mutation
    pub fn record_operation(&self, operation: &str, success: bool, duration_seconds: f64) {
        let outcome = if success { "ok" } else { "rejected" };
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration.observe(duration_seconds);
    }

    /// Record burned tokens (saturates at `u64::MAX`)
    pub fn record_burn(&self, amount: Amount) {
        if amount > 0 {
            self.burned_total
                .inc_by(u64::try_from(amount).unwrap_or(u64::MAX));
        }
    }

    /// Update the supply gauge (saturates at `i64::MAX`)
    pub fn set_total_supply(&self, supply: Amount) {
        self.total_supply
            .set(i64::try_from(supply).unwrap_or(i64::MAX));
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
