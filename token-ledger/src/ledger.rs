//! Ledger engine
//!
//! Owns balances, allowances and total supply, and implements every state
//! transition of the token: issuance, transfer (with the deflationary burn),
//! batch transfer, allowances, delegated transfer and burns.
//!
//! # Atomicity
//!
//! Each operation first stages its writes in a [`Changeset`], reading its own
//! pending writes, and only then commits. Commit persists the changeset (when
//! storage is attached), applies it in memory and appends its events to the
//! journal. A failed precondition or arithmetic check therefore never leaves a
//! partial mutation behind.
//!
//! # Example
//!
//! ```no_run
//! use token_ledger::{AccountId, Config, TokenLedger};
//!
//! fn main() -> token_ledger::Result<()> {
//!     let config = Config::default();
//!     let mut ledger = TokenLedger::issue(&config)?;
//!
//!     let issuer = config.token.issuer.clone();
//!     ledger.transfer(&issuer, &AccountId::new("0xb0b"), 1000)?;
//!     assert_eq!(ledger.balance_of(&AccountId::new("0xb0b")), 991);
//!     Ok(())
//! }
//! ```

use crate::{
    events::{EventLog, JournalHead},
    math,
    storage::{LedgerSnapshot, Storage},
    types::{AccountId, Amount, BatchReport, EntryOutcome, TokenEvent, TokenMetadata},
    Config, Error, Result,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed divisor of the burn calculation. Not derived from live supply.
pub const TAX_DIVISOR: Amount = 10_450;

/// Writes staged by one operation
#[derive(Debug, Default)]
pub(crate) struct Changeset {
    pub(crate) balances: Vec<(AccountId, Amount)>,
    pub(crate) allowances: Vec<((AccountId, AccountId), Amount)>,
    pub(crate) total_supply: Option<Amount>,
    pub(crate) events: Vec<TokenEvent>,
    pub(crate) genesis: Option<Genesis>,
}

/// Parameters fixed at issuance, persisted with the first changeset
#[derive(Debug, Clone)]
pub(crate) struct Genesis {
    pub(crate) metadata: TokenMetadata,
    pub(crate) base_percent: Amount,
}

impl Changeset {
    fn set_balance(&mut self, account: &AccountId, balance: Amount) {
        self.balances.push((account.clone(), balance));
    }

    fn set_allowance(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.allowances
            .push(((owner.clone(), spender.clone()), amount));
    }

    fn emit(&mut self, event: TokenEvent) {
        self.events.push(event);
    }
}

/// Deflationary token ledger
#[derive(Debug)]
pub struct TokenLedger {
    /// Display metadata
    metadata: TokenMetadata,

    /// Rounding unit and scale of the burn calculation
    base_percent: Amount,

    /// Current total supply
    total_supply: Amount,

    /// Balances (absent = zero)
    balances: HashMap<AccountId, Amount>,

    /// Allowances keyed by (owner, spender) (absent = zero)
    allowances: HashMap<(AccountId, AccountId), Amount>,

    /// Event journal
    events: EventLog,

    /// Persistent store, if enabled (shared with the journal)
    storage: Option<Arc<Storage>>,
}

impl TokenLedger {
    /// Issue a fresh in-memory ledger
    ///
    /// Credits `token.initial_supply` to `token.issuer`. Storage settings are
    /// ignored; use [`open`](Self::open) for a persistent ledger.
    pub fn issue(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut ledger = Self::empty(config, None);
        ledger.run_issuance(config)?;
        Ok(ledger)
    }

    /// Open a persistent ledger, issuing it on first use
    ///
    /// An existing store is restored as-is: no mint happens and the persisted
    /// tax base percent wins over the configured one.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        if !config.storage.enabled {
            return Self::issue(config);
        }

        let storage = Arc::new(Storage::open(config)?);
        match storage.load()? {
            Some(snapshot) => Self::restore(config, snapshot, storage),
            None => {
                let mut ledger = Self::empty(config, Some(storage));
                ledger.run_issuance(config)?;
                Ok(ledger)
            }
        }
    }

    fn empty(config: &Config, storage: Option<Arc<Storage>>) -> Self {
        let events = match &storage {
            Some(store) => EventLog::persistent(store.clone(), JournalHead::genesis()),
            None => EventLog::new(),
        };
        Self {
            metadata: config.token.metadata(),
            base_percent: Amount::from(config.tax.base_percent),
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            events,
            storage,
        }
    }

    fn restore(config: &Config, snapshot: LedgerSnapshot, storage: Arc<Storage>) -> Result<Self> {
        if snapshot.base_percent != Amount::from(config.tax.base_percent) {
            tracing::warn!(
                persisted = %snapshot.base_percent,
                configured = config.tax.base_percent,
                "Ignoring configured base_percent; ledger keeps its issuance value"
            );
        }

        let ledger = Self {
            metadata: snapshot.metadata,
            base_percent: snapshot.base_percent,
            total_supply: snapshot.total_supply,
            balances: snapshot.balances,
            allowances: snapshot.allowances,
            events: EventLog::persistent(storage.clone(), snapshot.journal),
            storage: Some(storage),
        };
        ledger.check_supply_invariant()?;

        tracing::info!(
            total_supply = %ledger.total_supply,
            accounts = ledger.balances.len(),
            events = ledger.events.len(),
            "Ledger restored"
        );

        Ok(ledger)
    }

    fn run_issuance(&mut self, config: &Config) -> Result<()> {
        let supply = Amount::from(config.token.initial_supply);

        let mut changes = Changeset {
            total_supply: Some(supply),
            genesis: Some(Genesis {
                metadata: self.metadata.clone(),
                base_percent: self.base_percent,
            }),
            ..Default::default()
        };
        self.mint(&mut changes, &config.token.issuer, supply)?;
        self.commit(changes)?;

        tracing::info!(
            issuer = %config.token.issuer,
            supply = %supply,
            symbol = %self.metadata.symbol,
            "Initial supply issued"
        );

        Ok(())
    }

    /// One-time issuance. Only reachable from construction.
    fn mint(&self, changes: &mut Changeset, account: &AccountId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        if account.is_null() {
            return Err(Error::InvalidRecipient);
        }

        let balance = math::add(self.staged_balance(changes, account), amount)?;
        changes.set_balance(account, balance);
        changes.emit(TokenEvent::Transfer {
            from: AccountId::null(),
            to: account.clone(),
            amount,
        });

        Ok(())
    }

    // Read API

    /// Token metadata
    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    /// Tax base percent fixed at issuance
    pub fn base_percent(&self) -> Amount {
        self.base_percent
    }

    /// Current total supply
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Balance of an account (zero if never referenced)
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Amount `spender` may still move from `owner`
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Event journal (shared; clones observe future events too)
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Persistent store, if attached
    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_deref()
    }

    /// Burn taken from a transfer of `value`
    ///
    /// `value` is rounded up to a multiple of the base percent, scaled by it
    /// and divided by [`TAX_DIVISOR`]. With the default base of 100, values up
    /// to 100 round to 100 and burn nothing (10_000 / 10_450 truncates to 0).
    pub fn half_percent_tax(&self, value: Amount) -> Result<Amount> {
        let round_value = math::ceil(value, self.base_percent)?;
        math::div(math::mul(round_value, self.base_percent)?, TAX_DIVISOR)
    }

    // Mutations

    /// Move `value` from `caller` to `to`, burning the transfer tax
    ///
    /// The full `value` leaves the caller; `to` receives `value - tax`.
    pub fn transfer(&mut self, caller: &AccountId, to: &AccountId, value: Amount) -> Result<()> {
        let mut changes = Changeset::default();
        let tax = self.stage_transfer(&mut changes, caller, to, value)?;
        self.commit(changes)?;

        tracing::debug!(from = %caller, to = %to, value = %value, burned = %tax, "Transfer committed");
        Ok(())
    }

    /// Apply one transfer per (recipient, amount) pair, in order
    ///
    /// Mismatched lengths fail up front. Otherwise each entry commits on its
    /// own; the first rejected entry stops the batch and later entries are
    /// reported as not executed. Earlier entries stay committed.
    pub fn multi_transfer(
        &mut self,
        caller: &AccountId,
        recipients: &[AccountId],
        amounts: &[Amount],
    ) -> Result<BatchReport> {
        if recipients.len() != amounts.len() {
            return Err(Error::IndexMismatch {
                recipients: recipients.len(),
                amounts: amounts.len(),
            });
        }

        let mut report = BatchReport {
            outcomes: Vec::with_capacity(recipients.len()),
        };
        let mut halted = false;

        for (to, &value) in recipients.iter().zip(amounts) {
            if halted {
                report.outcomes.push(EntryOutcome::NotExecuted);
                continue;
            }
            match self.transfer(caller, to, value) {
                Ok(()) => report.outcomes.push(EntryOutcome::Committed),
                Err(err) => {
                    tracing::debug!(from = %caller, to = %to, error = %err, "Batch entry rejected");
                    halted = true;
                    report.outcomes.push(EntryOutcome::Rejected(err));
                }
            }
        }

        Ok(report)
    }

    /// Set the allowance of `spender` over `caller`'s balance
    pub fn approve(&mut self, caller: &AccountId, spender: &AccountId, value: Amount) -> Result<()> {
        if spender.is_null() {
            return Err(Error::InvalidRecipient);
        }

        let mut changes = Changeset::default();
        self.stage_approval(&mut changes, caller, spender, value);
        self.commit(changes)
    }

    /// Raise the allowance of `spender` by `delta`
    pub fn increase_allowance(
        &mut self,
        caller: &AccountId,
        spender: &AccountId,
        delta: Amount,
    ) -> Result<()> {
        if spender.is_null() {
            return Err(Error::InvalidRecipient);
        }

        let value = math::add(self.allowance(caller, spender), delta)?;
        let mut changes = Changeset::default();
        self.stage_approval(&mut changes, caller, spender, value);
        self.commit(changes)
    }

    /// Lower the allowance of `spender` by `delta`; never clamps at zero
    pub fn decrease_allowance(
        &mut self,
        caller: &AccountId,
        spender: &AccountId,
        delta: Amount,
    ) -> Result<()> {
        if spender.is_null() {
            return Err(Error::InvalidRecipient);
        }

        let value = math::sub(self.allowance(caller, spender), delta)?;
        let mut changes = Changeset::default();
        self.stage_approval(&mut changes, caller, spender, value);
        self.commit(changes)
    }

    /// Move `value` from `from` to `to` on behalf of `spender`
    ///
    /// Same balance and supply effects as [`transfer`](Self::transfer) from
    /// `from`. The allowance shrinks by the gross `value`.
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        value: Amount,
    ) -> Result<()> {
        let balance = self.balance_of(from);
        if value > balance {
            return Err(Error::InsufficientBalance {
                have: balance,
                need: value,
            });
        }

        let allowance = self.allowance(from, spender);
        if value > allowance {
            return Err(Error::InsufficientAllowance {
                have: allowance,
                need: value,
            });
        }

        let mut changes = Changeset::default();
        let tax = self.stage_transfer(&mut changes, from, to, value)?;
        changes.set_allowance(from, spender, math::sub(allowance, value)?);
        self.commit(changes)?;

        tracing::debug!(
            spender = %spender,
            from = %from,
            to = %to,
            value = %value,
            burned = %tax,
            "Delegated transfer committed"
        );
        Ok(())
    }

    /// Destroy `amount` of the caller's tokens
    pub fn burn(&mut self, caller: &AccountId, amount: Amount) -> Result<()> {
        let mut changes = Changeset::default();
        self.stage_burn(&mut changes, caller, amount)?;
        self.commit(changes)?;

        tracing::debug!(account = %caller, amount = %amount, "Burn committed");
        Ok(())
    }

    /// Destroy `amount` of `account`'s tokens using `spender`'s allowance
    pub fn burn_from(
        &mut self,
        spender: &AccountId,
        account: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let allowance = self.allowance(account, spender);
        if amount > allowance {
            return Err(Error::InsufficientAllowance {
                have: allowance,
                need: amount,
            });
        }

        let mut changes = Changeset::default();
        changes.set_allowance(account, spender, math::sub(allowance, amount)?);
        self.stage_burn(&mut changes, account, amount)?;
        self.commit(changes)?;

        tracing::debug!(spender = %spender, account = %account, amount = %amount, "Delegated burn committed");
        Ok(())
    }

    /// Verify that balances add up to total supply
    pub fn check_supply_invariant(&self) -> Result<()> {
        let sum = self
            .balances
            .values()
            .try_fold(0, |acc: Amount, balance| math::add(acc, *balance))?;

        if sum != self.total_supply {
            return Err(Error::InvariantViolation(format!(
                "balances sum to {} but total supply is {}",
                sum, self.total_supply
            )));
        }
        Ok(())
    }

    // Staging

    fn staged_balance(&self, changes: &Changeset, account: &AccountId) -> Amount {
        changes
            .balances
            .iter()
            .rev()
            .find(|(a, _)| a == account)
            .map(|(_, balance)| *balance)
            .unwrap_or_else(|| self.balance_of(account))
    }

    fn staged_supply(&self, changes: &Changeset) -> Amount {
        changes.total_supply.unwrap_or(self.total_supply)
    }

    /// Stage a taxed transfer; returns the burned tax
    fn stage_transfer(
        &self,
        changes: &mut Changeset,
        from: &AccountId,
        to: &AccountId,
        value: Amount,
    ) -> Result<Amount> {
        let from_balance = self.staged_balance(changes, from);
        if value > from_balance {
            return Err(Error::InsufficientBalance {
                have: from_balance,
                need: value,
            });
        }
        if to.is_null() {
            return Err(Error::InvalidRecipient);
        }

        let tax = self.half_percent_tax(value)?;
        let net = math::sub(value, tax)?;

        changes.set_balance(from, math::sub(from_balance, value)?);
        // Read after the debit so a self-transfer sees it
        let to_balance = self.staged_balance(changes, to);
        changes.set_balance(to, math::add(to_balance, net)?);
        changes.total_supply = Some(math::sub(self.staged_supply(changes), tax)?);

        changes.emit(TokenEvent::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount: net,
        });
        changes.emit(TokenEvent::Transfer {
            from: from.clone(),
            to: AccountId::null(),
            amount: tax,
        });

        Ok(tax)
    }

    fn stage_burn(&self, changes: &mut Changeset, account: &AccountId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(Error::InvalidAmount);
        }
        let balance = self.staged_balance(changes, account);
        if amount > balance {
            return Err(Error::InsufficientBalance {
                have: balance,
                need: amount,
            });
        }

        changes.total_supply = Some(math::sub(self.staged_supply(changes), amount)?);
        changes.set_balance(account, math::sub(balance, amount)?);
        changes.emit(TokenEvent::Transfer {
            from: account.clone(),
            to: AccountId::null(),
            amount,
        });

        Ok(())
    }

    fn stage_approval(
        &self,
        changes: &mut Changeset,
        owner: &AccountId,
        spender: &AccountId,
        value: Amount,
    ) {
        changes.set_allowance(owner, spender, value);
        changes.emit(TokenEvent::Approval {
            owner: owner.clone(),
            spender: spender.clone(),
            amount: value,
        });
    }

    /// Persist, then apply in memory, then publish events
    fn commit(&mut self, mut changes: Changeset) -> Result<()> {
        let records = self.events.prepare(std::mem::take(&mut changes.events))?;

        if let Some(storage) = &self.storage {
            storage.write_changeset(&changes, &records)?;
        }

        for (account, balance) in changes.balances {
            self.balances.insert(account, balance);
        }
        for (key, amount) in changes.allowances {
            self.allowances.insert(key, amount);
        }
        if let Some(total_supply) = changes.total_supply {
            self.total_supply = total_supply;
        }
        self.events.append(records);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPLY: u64 = 1_000_000;

    fn alice() -> AccountId {
        AccountId::new("0xa11ce")
    }

    fn bob() -> AccountId {
        AccountId::new("0xb0b")
    }

    fn carol() -> AccountId {
        AccountId::new("0xca201")
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.token.issuer = alice();
        config.token.initial_supply = SUPPLY;
        config.storage.enabled = false;
        config
    }

    fn test_ledger() -> TokenLedger {
        TokenLedger::issue(&test_config()).unwrap()
    }

    fn transfer_event(from: AccountId, to: AccountId, amount: Amount) -> TokenEvent {
        TokenEvent::Transfer { from, to, amount }
    }

    #[test]
    fn test_issuance() {
        let ledger = test_ledger();
        assert_eq!(ledger.total_supply(), SUPPLY as Amount);
        assert_eq!(ledger.balance_of(&alice()), SUPPLY as Amount);
        assert_eq!(ledger.balance_of(&bob()), 0);
        assert_eq!(
            ledger.events().events().unwrap(),
            vec![transfer_event(AccountId::null(), alice(), SUPPLY as Amount)]
        );
        ledger.check_supply_invariant().unwrap();
    }

    #[test]
    fn test_issuance_rejects_invalid_config() {
        let mut config = test_config();
        config.token.initial_supply = 0;
        assert!(matches!(TokenLedger::issue(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_mint_preconditions() {
        let ledger = test_ledger();
        let mut changes = Changeset::default();
        assert!(matches!(
            ledger.mint(&mut changes, &bob(), 0),
            Err(Error::InvalidAmount)
        ));
        assert!(matches!(
            ledger.mint(&mut changes, &AccountId::null(), 5),
            Err(Error::InvalidRecipient)
        ));
        assert!(changes.balances.is_empty());
    }

    #[test]
    fn test_half_percent_tax() {
        let ledger = test_ledger();
        assert_eq!(ledger.half_percent_tax(0).unwrap(), 0);
        assert_eq!(ledger.half_percent_tax(1).unwrap(), 0);
        assert_eq!(ledger.half_percent_tax(50).unwrap(), 0);
        assert_eq!(ledger.half_percent_tax(100).unwrap(), 0);
        // ceil(101) = 200 -> 20000 / 10450 = 1
        assert_eq!(ledger.half_percent_tax(101).unwrap(), 1);
        assert_eq!(ledger.half_percent_tax(1000).unwrap(), 9);
        assert_eq!(ledger.half_percent_tax(10_450).unwrap(), 100);
        assert!(matches!(
            ledger.half_percent_tax(Amount::MAX),
            Err(Error::ArithmeticOverflow)
        ));
    }

    #[test]
    fn test_transfer_burns_tax() {
        let mut ledger = test_ledger();
        ledger.transfer(&alice(), &bob(), 1000).unwrap();

        assert_eq!(ledger.balance_of(&alice()), SUPPLY as Amount - 1000);
        assert_eq!(ledger.balance_of(&bob()), 991);
        assert_eq!(ledger.total_supply(), SUPPLY as Amount - 9);
        ledger.check_supply_invariant().unwrap();

        let events = ledger.events().events().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], transfer_event(alice(), bob(), 991));
        assert_eq!(events[2], transfer_event(alice(), AccountId::null(), 9));
    }

    #[test]
    fn test_transfer_zero_emits_both_events() {
        let mut ledger = test_ledger();
        ledger.transfer(&alice(), &bob(), 0).unwrap();

        assert_eq!(ledger.balance_of(&bob()), 0);
        assert_eq!(ledger.total_supply(), SUPPLY as Amount);
        let events = ledger.events().events().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], transfer_event(alice(), bob(), 0));
        assert_eq!(events[2], transfer_event(alice(), AccountId::null(), 0));
    }

    #[test]
    fn test_transfer_insufficient_balance_leaves_state() {
        let mut ledger = test_ledger();
        let err = ledger
            .transfer(&alice(), &bob(), SUPPLY as Amount + 1)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { have, need }
            if have == SUPPLY as Amount && need == SUPPLY as Amount + 1));

        assert_eq!(ledger.balance_of(&alice()), SUPPLY as Amount);
        assert_eq!(ledger.total_supply(), SUPPLY as Amount);
        assert_eq!(ledger.events().len(), 1);
    }

    #[test]
    fn test_transfer_to_null_rejected() {
        let mut ledger = test_ledger();
        assert!(matches!(
            ledger.transfer(&alice(), &AccountId::null(), 10),
            Err(Error::InvalidRecipient)
        ));
        // Balance is checked before the recipient
        assert!(matches!(
            ledger.transfer(&bob(), &AccountId::null(), 10),
            Err(Error::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_self_transfer_only_burns_tax() {
        let mut ledger = test_ledger();
        ledger.transfer(&alice(), &alice(), 1000).unwrap();
        assert_eq!(ledger.balance_of(&alice()), SUPPLY as Amount - 9);
        assert_eq!(ledger.total_supply(), SUPPLY as Amount - 9);
        ledger.check_supply_invariant().unwrap();
    }

    #[test]
    fn test_multi_transfer() {
        let mut ledger = test_ledger();
        let report = ledger
            .multi_transfer(&alice(), &[bob(), carol()], &[1000, 50])
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(ledger.balance_of(&bob()), 991);
        assert_eq!(ledger.balance_of(&carol()), 50);
        assert_eq!(ledger.total_supply(), SUPPLY as Amount - 9);
    }

    #[test]
    fn test_multi_transfer_index_mismatch() {
        let mut ledger = test_ledger();
        let err = ledger
            .multi_transfer(&alice(), &[bob(), carol()], &[1000])
            .unwrap_err();
        assert!(matches!(err, Error::IndexMismatch { recipients: 2, amounts: 1 }));
        assert_eq!(ledger.balance_of(&bob()), 0);
        assert_eq!(ledger.events().len(), 1);
    }

    #[test]
    fn test_multi_transfer_is_not_atomic() {
        let mut ledger = test_ledger();
        let report = ledger
            .multi_transfer(
                &alice(),
                &[bob(), AccountId::null(), carol()],
                &[1000, 10, 10],
            )
            .unwrap();

        assert_eq!(report.committed(), 1);
        assert!(report.outcomes[0].is_committed());
        assert!(matches!(
            report.outcomes[1],
            EntryOutcome::Rejected(Error::InvalidRecipient)
        ));
        assert!(matches!(report.outcomes[2], EntryOutcome::NotExecuted));

        // First entry stays committed, third never ran
        assert_eq!(ledger.balance_of(&bob()), 991);
        assert_eq!(ledger.balance_of(&carol()), 0);
        ledger.check_supply_invariant().unwrap();
    }

    #[test]
    fn test_approve_overwrites() {
        let mut ledger = test_ledger();
        ledger.approve(&alice(), &bob(), 500).unwrap();
        assert_eq!(ledger.allowance(&alice(), &bob()), 500);

        ledger.approve(&alice(), &bob(), 20).unwrap();
        assert_eq!(ledger.allowance(&alice(), &bob()), 20);

        assert_eq!(
            ledger.events().events().unwrap().last().unwrap(),
            &TokenEvent::Approval {
                owner: alice(),
                spender: bob(),
                amount: 20
            }
        );
        assert!(matches!(
            ledger.approve(&alice(), &AccountId::null(), 1),
            Err(Error::InvalidRecipient)
        ));
    }

    #[test]
    fn test_increase_decrease_allowance() {
        let mut ledger = test_ledger();
        ledger.approve(&alice(), &bob(), 100).unwrap();
        ledger.increase_allowance(&alice(), &bob(), 40).unwrap();
        assert_eq!(ledger.allowance(&alice(), &bob()), 140);
        ledger.decrease_allowance(&alice(), &bob(), 40).unwrap();
        assert_eq!(ledger.allowance(&alice(), &bob()), 100);

        assert!(matches!(
            ledger.decrease_allowance(&alice(), &bob(), 101),
            Err(Error::ArithmeticUnderflow)
        ));
        assert_eq!(ledger.allowance(&alice(), &bob()), 100);

        ledger.approve(&alice(), &bob(), Amount::MAX).unwrap();
        assert!(matches!(
            ledger.increase_allowance(&alice(), &bob(), 1),
            Err(Error::ArithmeticOverflow)
        ));
        assert!(matches!(
            ledger.increase_allowance(&alice(), &AccountId::null(), 1),
            Err(Error::InvalidRecipient)
        ));
    }

    #[test]
    fn test_transfer_from() {
        let mut ledger = test_ledger();
        ledger.approve(&alice(), &bob(), 1500).unwrap();
        ledger.transfer_from(&bob(), &alice(), &carol(), 1000).unwrap();

        assert_eq!(ledger.balance_of(&alice()), SUPPLY as Amount - 1000);
        assert_eq!(ledger.balance_of(&carol()), 991);
        assert_eq!(ledger.balance_of(&bob()), 0);
        // Gross amount comes off the allowance
        assert_eq!(ledger.allowance(&alice(), &bob()), 500);
        assert_eq!(ledger.total_supply(), SUPPLY as Amount - 9);

        let events = ledger.events().events().unwrap();
        let tail = &events[events.len() - 2..];
        assert_eq!(tail[0], transfer_event(alice(), carol(), 991));
        assert_eq!(tail[1], transfer_event(alice(), AccountId::null(), 9));
    }

    #[test]
    fn test_transfer_from_preconditions() {
        let mut ledger = test_ledger();
        ledger.approve(&alice(), &bob(), 10).unwrap();

        assert!(matches!(
            ledger.transfer_from(&bob(), &alice(), &carol(), 11),
            Err(Error::InsufficientAllowance { have: 10, need: 11 })
        ));
        assert!(matches!(
            ledger.transfer_from(&bob(), &carol(), &alice(), 1),
            Err(Error::InsufficientBalance { have: 0, need: 1 })
        ));
        assert!(matches!(
            ledger.transfer_from(&bob(), &alice(), &AccountId::null(), 5),
            Err(Error::InvalidRecipient)
        ));
        assert_eq!(ledger.allowance(&alice(), &bob()), 10);
        assert_eq!(ledger.balance_of(&alice()), SUPPLY as Amount);
    }

    #[test]
    fn test_burn() {
        let mut ledger = test_ledger();
        ledger.burn(&alice(), 250).unwrap();
        assert_eq!(ledger.balance_of(&alice()), SUPPLY as Amount - 250);
        assert_eq!(ledger.total_supply(), SUPPLY as Amount - 250);
        assert_eq!(
            ledger.events().events().unwrap().last().unwrap(),
            &transfer_event(alice(), AccountId::null(), 250)
        );

        assert!(matches!(ledger.burn(&alice(), 0), Err(Error::InvalidAmount)));
        assert!(matches!(
            ledger.burn(&bob(), 1),
            Err(Error::InsufficientBalance { have: 0, need: 1 })
        ));
        assert_eq!(ledger.total_supply(), SUPPLY as Amount - 250);
    }

    #[test]
    fn test_burn_from() {
        let mut ledger = test_ledger();
        ledger.approve(&alice(), &bob(), 300).unwrap();
        ledger.burn_from(&bob(), &alice(), 200).unwrap();

        assert_eq!(ledger.allowance(&alice(), &bob()), 100);
        assert_eq!(ledger.balance_of(&alice()), SUPPLY as Amount - 200);
        assert_eq!(ledger.total_supply(), SUPPLY as Amount - 200);

        assert!(matches!(
            ledger.burn_from(&bob(), &alice(), 101),
            Err(Error::InsufficientAllowance { have: 100, need: 101 })
        ));
    }

    #[test]
    fn test_burn_from_is_atomic() {
        let mut ledger = test_ledger();
        // Carol approves bob but holds nothing
        ledger.approve(&carol(), &bob(), 50).unwrap();

        assert!(matches!(
            ledger.burn_from(&bob(), &carol(), 10),
            Err(Error::InsufficientBalance { .. })
        ));
        assert!(matches!(
            ledger.burn_from(&bob(), &carol(), 0),
            Err(Error::InvalidAmount)
        ));
        // Allowance decrement rolled back with the failed burn
        assert_eq!(ledger.allowance(&carol(), &bob()), 50);
    }

    #[test]
    fn test_queries_do_not_mutate() {
        let ledger = test_ledger();
        let before = ledger.events().len();
        for _ in 0..3 {
            assert_eq!(ledger.balance_of(&alice()), SUPPLY as Amount);
            assert_eq!(ledger.allowance(&alice(), &bob()), 0);
            assert_eq!(ledger.total_supply(), SUPPLY as Amount);
        }
        assert_eq!(ledger.events().len(), before);
    }

    #[test]
    fn test_journal_chain_after_operations() {
        let mut ledger = test_ledger();
        ledger.transfer(&alice(), &bob(), 5000).unwrap();
        ledger.approve(&bob(), &carol(), 100).unwrap();
        ledger.transfer_from(&carol(), &bob(), &carol(), 100).unwrap();
        ledger.burn(&alice(), 1).unwrap();

        ledger.events().verify_chain().unwrap();
        assert_eq!(ledger.events().last_sequence(), ledger.events().len() as u64);
    }

    #[test]
    fn test_largest_base_percent_never_taxes_beyond_value() {
        let mut config = test_config();
        config.tax.base_percent = 144;
        let mut ledger = TokenLedger::issue(&config).unwrap();

        for value in 1..=300 {
            ledger.transfer(&alice(), &bob(), value).unwrap();
        }
        ledger.check_supply_invariant().unwrap();

        config.tax.base_percent = 200;
        assert!(matches!(TokenLedger::issue(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_persistent_journal_is_not_resident() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.data_dir = temp_dir.path().to_path_buf();
        config.storage.enabled = true;

        {
            let mut ledger = TokenLedger::open(&config).unwrap();
            for _ in 0..50 {
                ledger.transfer(&alice(), &bob(), 1000).unwrap();
            }
            assert_eq!(ledger.events().len(), 101);
            assert_eq!(ledger.events().resident_len(), 0);
        }

        let ledger = TokenLedger::open(&config).unwrap();
        let events = ledger.events();
        assert_eq!(events.len(), 101);
        assert_eq!(events.last_sequence(), 101);
        assert_eq!(events.resident_len(), 0);

        events.verify_chain().unwrap();
        let tail = events.since(99).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].event, transfer_event(alice(), bob(), 991));
        assert_eq!(tail[1].event, transfer_event(alice(), AccountId::null(), 9));
        assert_eq!(
            events.events().unwrap()[0],
            transfer_event(AccountId::null(), alice(), SUPPLY as Amount)
        );
    }

    #[test]
    fn test_custom_base_percent() {
        let mut config = test_config();
        config.tax.base_percent = 10;
        let ledger = TokenLedger::issue(&config).unwrap();
        // ceil(1000, 10) * 10 / 10450 = 0
        assert_eq!(ledger.half_percent_tax(1000).unwrap(), 0);
        // ceil(20000, 10) * 10 / 10450 = 19
        assert_eq!(ledger.half_percent_tax(20_000).unwrap(), 19);
    }
}
