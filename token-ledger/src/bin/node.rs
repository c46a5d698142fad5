//! Ledger node binary

use anyhow::Context;
use token_ledger::{spawn_ledger_actor, Config, Metrics, TokenLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting token ledger node");

    // Load configuration
    let config = match std::env::var("LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("failed to load config from environment")?,
    };

    // Open ledger
    let ledger = TokenLedger::open(&config).context("failed to open ledger")?;
    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        name = %ledger.metadata().name,
        symbol = %ledger.metadata().symbol,
        decimals = ledger.metadata().decimals,
        total_supply = %ledger.total_supply(),
        "Ledger opened successfully"
    );

    let metrics = Metrics::new().context("failed to register metrics")?;
    let handle = spawn_ledger_actor(ledger, config.actor.mailbox_capacity, Some(metrics.clone()));

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down ledger node");
    let ledger = handle.shutdown().await?;
    ledger.check_supply_invariant()?;
    if let Some(storage) = ledger.storage() {
        let stats = storage.get_stats()?;
        tracing::info!(
            accounts = stats.accounts,
            allowances = stats.allowances,
            events = stats.events,
            "Storage stats"
        );
    }
    tracing::info!(
        head = %token_ledger::crypto::to_hex(&ledger.events().head_digest()),
        "Final metrics:\n{}",
        metrics.render()?
    );

    Ok(())
}
