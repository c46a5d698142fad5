//! Actor-based concurrency for the ledger
//!
//! One tokio task owns the [`TokenLedger`] and applies messages from a
//! bounded mailbox one at a time, so mutations never interleave and every read
//! sees the latest committed write.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Host (identity layer, API surface)           │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ caller-authenticated requests
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   TokenLedger: stage → persist → apply → journal     │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::{
    events::EventLog,
    metrics::Metrics,
    types::{AccountId, Amount, BatchReport, TokenMetadata},
    Error, Result, TokenLedger,
};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Taxed transfer from the caller
    Transfer {
        caller: AccountId,
        to: AccountId,
        value: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Batch of transfers from the caller
    MultiTransfer {
        caller: AccountId,
        recipients: Vec<AccountId>,
        amounts: Vec<Amount>,
        response: oneshot::Sender<Result<BatchReport>>,
    },

    /// Set an allowance
    Approve {
        caller: AccountId,
        spender: AccountId,
        value: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Raise an allowance
    IncreaseAllowance {
        caller: AccountId,
        spender: AccountId,
        delta: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Lower an allowance
    DecreaseAllowance {
        caller: AccountId,
        spender: AccountId,
        delta: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Delegated transfer
    TransferFrom {
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        value: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Burn the caller's tokens
    Burn {
        caller: AccountId,
        amount: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Delegated burn
    BurnFrom {
        spender: AccountId,
        account: AccountId,
        amount: Amount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Query total supply
    TotalSupply { response: oneshot::Sender<Amount> },

    /// Query a balance
    BalanceOf {
        account: AccountId,
        response: oneshot::Sender<Amount>,
    },

    /// Query an allowance
    Allowance {
        owner: AccountId,
        spender: AccountId,
        response: oneshot::Sender<Amount>,
    },

    /// Query token metadata
    Metadata {
        response: oneshot::Sender<TokenMetadata>,
    },

    /// Verify supply conservation
    CheckInvariant {
        response: oneshot::Sender<Result<()>>,
    },

    /// Stop the actor and hand the ledger back
    Shutdown {
        response: oneshot::Sender<TokenLedger>,
    },
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// The ledger, exclusively owned
    ledger: TokenLedger,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Optional metrics sink
    metrics: Option<Metrics>,
}

impl std::fmt::Debug for LedgerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerActor")
            .field("ledger", &self.ledger)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        ledger: TokenLedger,
        mailbox: mpsc::Receiver<LedgerMessage>,
        metrics: Option<Metrics>,
    ) -> Self {
        if let Some(metrics) = &metrics {
            metrics.set_total_supply(ledger.total_supply());
        }
        Self {
            ledger,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown { response } = msg {
                tracing::info!("Ledger actor shutting down");
                if response.send(self.ledger).is_err() {
                    tracing::warn!("Shutdown requester went away; dropping ledger");
                }
                return;
            }
            self.handle_message(msg);
        }
        tracing::info!("Ledger mailbox closed");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        let delivered = match msg {
            LedgerMessage::Transfer {
                caller,
                to,
                value,
                response,
            } => {
                let result = self.mutate("transfer", |l| l.transfer(&caller, &to, value));
                response.send(result).is_ok()
            }

            LedgerMessage::MultiTransfer {
                caller,
                recipients,
                amounts,
                response,
            } => {
                let result = self.mutate("multi_transfer", |l| {
                    l.multi_transfer(&caller, &recipients, &amounts)
                });
                response.send(result).is_ok()
            }

            LedgerMessage::Approve {
                caller,
                spender,
                value,
                response,
            } => {
                let result = self.mutate("approve", |l| l.approve(&caller, &spender, value));
                response.send(result).is_ok()
            }

            LedgerMessage::IncreaseAllowance {
                caller,
                spender,
                delta,
                response,
            } => {
                let result = self.mutate("increase_allowance", |l| {
                    l.increase_allowance(&caller, &spender, delta)
                });
                response.send(result).is_ok()
            }

            LedgerMessage::DecreaseAllowance {
                caller,
                spender,
                delta,
                response,
            } => {
                let result = self.mutate("decrease_allowance", |l| {
                    l.decrease_allowance(&caller, &spender, delta)
                });
                response.send(result).is_ok()
            }

            LedgerMessage::TransferFrom {
                spender,
                from,
                to,
                value,
                response,
            } => {
                let result = self.mutate("transfer_from", |l| {
                    l.transfer_from(&spender, &from, &to, value)
                });
                response.send(result).is_ok()
            }

            LedgerMessage::Burn {
                caller,
                amount,
                response,
            } => {
                let result = self.mutate("burn", |l| l.burn(&caller, amount));
                response.send(result).is_ok()
            }

            LedgerMessage::BurnFrom {
                spender,
                account,
                amount,
                response,
            } => {
                let result = self.mutate("burn_from", |l| l.burn_from(&spender, &account, amount));
                response.send(result).is_ok()
            }

            LedgerMessage::TotalSupply { response } => {
                response.send(self.ledger.total_supply()).is_ok()
            }

            LedgerMessage::BalanceOf { account, response } => {
                response.send(self.ledger.balance_of(&account)).is_ok()
            }

            LedgerMessage::Allowance {
                owner,
                spender,
                response,
            } => response.send(self.ledger.allowance(&owner, &spender)).is_ok(),

            LedgerMessage::Metadata { response } => {
                response.send(self.ledger.metadata().clone()).is_ok()
            }

            LedgerMessage::CheckInvariant { response } => {
                response.send(self.ledger.check_supply_invariant()).is_ok()
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in run loop
                true
            }
        };

        if !delivered {
            tracing::error!("Response channel closed before reply");
        }
    }

    /// Apply one mutation and record its outcome
    fn mutate<T>(
        &mut self,
        operation: &'static str,
        apply: impl FnOnce(&mut TokenLedger) -> Result<T>,
    ) -> Result<T> {
        let supply_before = self.ledger.total_supply();
        let started = Instant::now();

        let result = apply(&mut self.ledger);

        if let Err(e) = &result {
            tracing::warn!(operation, error = %e, kind = e.kind(), "Operation rejected");
        }

        if let Some(metrics) = &self.metrics {
            let supply_after = self.ledger.total_supply();
            metrics.record_operation(operation, result.is_ok(), started.elapsed().as_secs_f64());
            metrics.record_burn(supply_before.saturating_sub(supply_after));
            metrics.set_total_supply(supply_after);
        }

        result
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
    events: EventLog,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>, events: EventLog) -> Self {
        Self { sender, events }
    }

    /// Read-only view of the event journal
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Taxed transfer from `caller` to `to`
    pub async fn transfer(&self, caller: AccountId, to: AccountId, value: Amount) -> Result<()> {
        self.request(|response| LedgerMessage::Transfer {
            caller,
            to,
            value,
            response,
        })
        .await?
    }

    /// Batch transfer from `caller`
    pub async fn multi_transfer(
        &self,
        caller: AccountId,
        recipients: Vec<AccountId>,
        amounts: Vec<Amount>,
    ) -> Result<BatchReport> {
        self.request(|response| LedgerMessage::MultiTransfer {
            caller,
            recipients,
            amounts,
            response,
        })
        .await?
    }

    /// Set `spender`'s allowance over `caller`
    pub async fn approve(&self, caller: AccountId, spender: AccountId, value: Amount) -> Result<()> {
        self.request(|response| LedgerMessage::Approve {
            caller,
            spender,
            value,
            response,
        })
        .await?
    }

    /// Raise `spender`'s allowance over `caller`
    pub async fn increase_allowance(
        &self,
        caller: AccountId,
        spender: AccountId,
        delta: Amount,
    ) -> Result<()> {
        self.request(|response| LedgerMessage::IncreaseAllowance {
            caller,
            spender,
            delta,
            response,
        })
        .await?
    }

    /// Lower `spender`'s allowance over `caller`
    pub async fn decrease_allowance(
        &self,
        caller: AccountId,
        spender: AccountId,
        delta: Amount,
    ) -> Result<()> {
        self.request(|response| LedgerMessage::DecreaseAllowance {
            caller,
            spender,
            delta,
            response,
        })
        .await?
    }

    /// Delegated transfer by `spender`
    pub async fn transfer_from(
        &self,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        value: Amount,
    ) -> Result<()> {
        self.request(|response| LedgerMessage::TransferFrom {
            spender,
            from,
            to,
            value,
            response,
        })
        .await?
    }

    /// Burn `caller`'s tokens
    pub async fn burn(&self, caller: AccountId, amount: Amount) -> Result<()> {
        self.request(|response| LedgerMessage::Burn {
            caller,
            amount,
            response,
        })
        .await?
    }

    /// Delegated burn by `spender`
    pub async fn burn_from(
        &self,
        spender: AccountId,
        account: AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.request(|response| LedgerMessage::BurnFrom {
            spender,
            account,
            amount,
            response,
        })
        .await?
    }

    /// Current total supply
    pub async fn total_supply(&self) -> Result<Amount> {
        self.request(|response| LedgerMessage::TotalSupply { response })
            .await
    }

    /// Balance of `account`
    pub async fn balance_of(&self, account: AccountId) -> Result<Amount> {
        self.request(|response| LedgerMessage::BalanceOf { account, response })
            .await
    }

    /// Allowance of `spender` over `owner`
    pub async fn allowance(&self, owner: AccountId, spender: AccountId) -> Result<Amount> {
        self.request(|response| LedgerMessage::Allowance {
            owner,
            spender,
            response,
        })
        .await
    }

    /// Token metadata
    pub async fn metadata(&self) -> Result<TokenMetadata> {
        self.request(|response| LedgerMessage::Metadata { response })
            .await
    }

    /// Verify that balances sum to total supply
    pub async fn check_supply_invariant(&self) -> Result<()> {
        self.request(|response| LedgerMessage::CheckInvariant { response })
            .await?
    }

    /// Stop the actor and take the ledger back
    pub async fn shutdown(&self) -> Result<TokenLedger> {
        self.request(|response| LedgerMessage::Shutdown { response })
            .await
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    ledger: TokenLedger,
    mailbox_capacity: usize,
    metrics: Option<Metrics>,
) -> LedgerHandle {
    let events = ledger.events().clone();
    // Bounded channel for backpressure
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let actor = LedgerActor::new(ledger, rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx, events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn issuer() -> AccountId {
        AccountId::new("0xissuer")
    }

    fn test_ledger() -> TokenLedger {
        let mut config = Config::default();
        config.token.issuer = issuer();
        config.token.initial_supply = 10_000;
        config.storage.enabled = false;
        TokenLedger::issue(&config).unwrap()
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let handle = spawn_ledger_actor(test_ledger(), 16, None);
        let ledger = handle.shutdown().await.unwrap();
        assert_eq!(ledger.total_supply(), 10_000);

        // Mailbox is gone after shutdown
        assert!(matches!(
            handle.total_supply().await,
            Err(Error::Concurrency(_))
        ));
    }

    #[tokio::test]
    async fn test_actor_transfer_and_queries() {
        let handle = spawn_ledger_actor(test_ledger(), 16, None);
        let bob = AccountId::new("0xb0b");

        handle.transfer(issuer(), bob.clone(), 1000).await.unwrap();
        assert_eq!(handle.balance_of(bob.clone()).await.unwrap(), 991);
        assert_eq!(handle.total_supply().await.unwrap(), 9_991);
        handle.check_supply_invariant().await.unwrap();

        // Event journal is observable through the handle
        assert_eq!(handle.events().len(), 3);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejection_reaches_caller() {
        let handle = spawn_ledger_actor(test_ledger(), 16, None);

        let err = handle
            .burn(AccountId::new("0xnobody"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_records_metrics() {
        let metrics = Metrics::new().unwrap();
        let handle = spawn_ledger_actor(test_ledger(), 16, Some(metrics.clone()));
        let bob = AccountId::new("0xb0b");

        handle.transfer(issuer(), bob.clone(), 1000).await.unwrap();
        handle.burn(issuer(), 100).await.unwrap();
        let _ = handle.burn(bob, 0).await;

        assert_eq!(metrics.burned_total.get(), 109);
        assert_eq!(metrics.total_supply.get(), 9_891);
        assert_eq!(
            metrics
                .operations_total
                .with_label_values(&["burn", "rejected"])
                .get(),
            1
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_handles_serialize() {
        let handle = spawn_ledger_actor(test_ledger(), 64, None);

        let mut tasks = Vec::new();
        for i in 0..20 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .transfer(issuer(), AccountId::new(format!("0x{:02}", i)), 100)
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // 100 burns nothing, so all 2000 moved without tax
        assert_eq!(handle.balance_of(issuer()).await.unwrap(), 8_000);
        assert_eq!(handle.total_supply().await.unwrap(), 10_000);
        handle.check_supply_invariant().await.unwrap();

        handle.shutdown().await.unwrap();
    }
}
