//! The wallet ledger — one critical section per settlement.
//!
//! All three balance mutations (debit payer, credit payee, credit fee to
//! the platform wallet), the settlement-record write, and the outbox
//! append happen under a single lock acquisition: the in-memory stand-in
//! for one database transaction. Validation failures leave every balance
//! untouched — there is no partial debit.
//!
//! The ledger also enforces the record-per-key invariant below the
//! idempotency cache (defense in depth) and tracks per-currency supply so
//! conservation can be asserted after any number of settlements.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Notify;
use tracing::{info, warn};

use opensettle_types::{
    AccountId, Clock, Currency, IdempotencyKey, LedgerEvent, Result, SettleError,
    SettlementCommand, SettlementId, SettlementRecord, SharedClock, Wallet, WalletId, WalletStatus,
};

/// Everything the ledger lock guards.
struct LedgerState {
    /// All wallets by id.
    wallets: HashMap<WalletId, Wallet>,
    /// Settlement records, one per idempotency key.
    records: HashMap<IdempotencyKey, SettlementRecord>,
    /// Settlement-id → key index for lookups.
    by_id: HashMap<SettlementId, IdempotencyKey>,
    /// Platform fee wallet per currency.
    platform: HashMap<Currency, WalletId>,
    /// Total deposits per currency since genesis, for conservation checks.
    deposits: HashMap<Currency, Decimal>,
    /// Transactional outbox: events written with their causing mutation.
    outbox: VecDeque<LedgerEvent>,
}

/// The wallet ledger.
pub struct Ledger {
    state: Mutex<LedgerState>,
    /// Wakes the outbox relay after events are appended.
    notify: Notify,
    /// The account that owns platform fee wallets.
    platform_owner: AccountId,
    clock: SharedClock,
}

impl Ledger {
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                wallets: HashMap::new(),
                records: HashMap::new(),
                by_id: HashMap::new(),
                platform: HashMap::new(),
                deposits: HashMap::new(),
                outbox: VecDeque::new(),
            }),
            notify: Notify::new(),
            platform_owner: AccountId::new(),
            clock,
        }
    }

    // -----------------------------------------------------------------
    // Wallet administration
    // -----------------------------------------------------------------

    /// Register a wallet. Replaces nothing: re-registering an id is an error.
    pub fn register_wallet(&self, wallet: Wallet) -> Result<WalletId> {
        let mut state = self.lock();
        let id = wallet.id;
        if state.wallets.contains_key(&id) {
            return Err(SettleError::Internal(format!(
                "wallet {id} already registered"
            )));
        }
        state.wallets.insert(id, wallet);
        Ok(id)
    }

    /// Create and register a fresh active wallet.
    pub fn create_wallet(&self, owner: AccountId, currency: &str) -> Result<WalletId> {
        self.register_wallet(Wallet::new(owner, currency))
    }

    /// Deposit external funds into a wallet.
    pub fn deposit(&self, wallet_id: WalletId, amount: Decimal) -> Result<()> {
        let mut state = self.lock();
        let wallet = state
            .wallets
            .get_mut(&wallet_id)
            .ok_or(SettleError::WalletNotFound(wallet_id))?;
        wallet.ensure_operational()?;
        wallet.balance += amount;
        let currency = wallet.currency.clone();
        *state.deposits.entry(currency).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    /// Snapshot of a wallet.
    #[must_use]
    pub fn wallet(&self, wallet_id: WalletId) -> Option<Wallet> {
        self.lock().wallets.get(&wallet_id).cloned()
    }

    /// Current balance of a wallet.
    pub fn balance(&self, wallet_id: WalletId) -> Result<Decimal> {
        self.lock()
            .wallets
            .get(&wallet_id)
            .map(|wallet| wallet.balance)
            .ok_or(SettleError::WalletNotFound(wallet_id))
    }

    /// Change a wallet's status (freeze, thaw, close).
    pub fn set_wallet_status(&self, wallet_id: WalletId, status: WalletStatus) -> Result<()> {
        let mut state = self.lock();
        let wallet = state
            .wallets
            .get_mut(&wallet_id)
            .ok_or(SettleError::WalletNotFound(wallet_id))?;
        wallet.set_status(status)
    }

    /// The platform fee wallet for a currency, created on first use.
    pub fn platform_wallet(&self, currency: &str) -> WalletId {
        let mut state = self.lock();
        Self::platform_wallet_locked(&mut state, self.platform_owner, currency)
    }

    fn platform_wallet_locked(
        state: &mut LedgerState,
        owner: AccountId,
        currency: &str,
    ) -> WalletId {
        if let Some(id) = state.platform.get(currency) {
            return *id;
        }
        let wallet = Wallet::new(owner, currency);
        let id = wallet.id;
        state.wallets.insert(id, wallet);
        state.platform.insert(currency.to_string(), id);
        id
    }

    // -----------------------------------------------------------------
    // Settlement application
    // -----------------------------------------------------------------

    /// Apply an authorized settlement command atomically.
    ///
    /// Replays the existing record if the idempotency key already resolved
    /// — the record-per-key invariant holds even if the cache tier was
    /// bypassed.
    ///
    /// # Errors
    /// - `InsufficientBalance` if the payer cannot cover the gross amount
    /// - `WalletUnavailable` / `WalletNotFound` / `CurrencyMismatch` per
    ///   wallet preconditions
    pub fn apply(&self, command: &SettlementCommand, fee: Decimal) -> Result<SettlementRecord> {
        let now = self.clock.now();
        let record = {
            let mut state = self.lock();
            self.apply_locked(&mut state, command, fee, now)?
        };
        self.notify.notify_waiters();
        Ok(record)
    }

    /// Apply a batch of commands in one lock acquisition — the whole batch
    /// costs one round trip instead of N. A failed command leaves its own
    /// balances untouched and does not abort the commands after it.
    pub fn apply_batch(
        &self,
        items: &[(&SettlementCommand, Decimal)],
    ) -> Vec<Result<SettlementRecord>> {
        let now = self.clock.now();
        let results = {
            let mut state = self.lock();
            items
                .iter()
                .map(|(command, fee)| self.apply_locked(&mut state, command, *fee, now))
                .collect()
        };
        self.notify.notify_waiters();
        results
    }

    fn apply_locked(
        &self,
        state: &mut LedgerState,
        command: &SettlementCommand,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Result<SettlementRecord> {
        // Record-per-key invariant: replay, never re-execute.
        if let Some(existing) = state.records.get(&command.idempotency_key) {
            warn!(key = %command.idempotency_key, "ledger replay below the idempotency cache");
            return Ok(existing.clone());
        }

        if command.payer == command.payee {
            return Err(SettleError::SettlementFailed {
                reason: "payer and payee are the same wallet".to_string(),
            });
        }
        if fee < Decimal::ZERO || fee > command.gross_amount {
            return Err(SettleError::SettlementFailed {
                reason: format!("fee {fee} out of range for gross {}", command.gross_amount),
            });
        }

        // Preconditions — nothing is mutated until all of them pass.
        let payer = state
            .wallets
            .get(&command.payer)
            .ok_or(SettleError::WalletNotFound(command.payer))?;
        payer.ensure_operational()?;
        payer.ensure_currency(&command.currency)?;
        if payer.balance < command.gross_amount {
            return Err(SettleError::InsufficientBalance {
                needed: command.gross_amount,
                available: payer.balance,
            });
        }

        let payee = state
            .wallets
            .get(&command.payee)
            .ok_or(SettleError::WalletNotFound(command.payee))?;
        payee.ensure_operational()?;
        payee.ensure_currency(&command.currency)?;

        let platform_id =
            Self::platform_wallet_locked(state, self.platform_owner, &command.currency);

        // The atomic movement: debit gross, credit net, credit fee.
        let net = command.gross_amount - fee;
        state
            .wallets
            .get_mut(&command.payer)
            .expect("payer checked above")
            .balance -= command.gross_amount;
        state
            .wallets
            .get_mut(&command.payee)
            .expect("payee checked above")
            .balance += net;
        state
            .wallets
            .get_mut(&platform_id)
            .expect("platform wallet created above")
            .balance += fee;

        let record = SettlementRecord::completed(command, fee, now);
        state
            .records
            .insert(command.idempotency_key.clone(), record.clone());
        state.by_id.insert(record.id, command.idempotency_key.clone());
        state.outbox.push_back(LedgerEvent::SettlementCompleted {
            record: record.clone(),
            payout: command.payout.clone(),
        });

        info!(
            settlement = %record.id,
            payer = %command.payer,
            payee = %command.payee,
            gross = %command.gross_amount,
            fee = %fee,
            protocol = %command.protocol,
            "settlement completed"
        );
        Ok(record)
    }

    /// Run every settlement precondition without mutating anything.
    pub fn check(&self, command: &SettlementCommand, fee: Decimal) -> Result<()> {
        let state = self.lock();

        if command.payer == command.payee {
            return Err(SettleError::SettlementFailed {
                reason: "payer and payee are the same wallet".to_string(),
            });
        }
        let payer = state
            .wallets
            .get(&command.payer)
            .ok_or(SettleError::WalletNotFound(command.payer))?;
        payer.ensure_operational()?;
        payer.ensure_currency(&command.currency)?;
        if payer.balance < command.gross_amount {
            return Err(SettleError::InsufficientBalance {
                needed: command.gross_amount,
                available: payer.balance,
            });
        }
        let payee = state
            .wallets
            .get(&command.payee)
            .ok_or(SettleError::WalletNotFound(command.payee))?;
        payee.ensure_operational()?;
        payee.ensure_currency(&command.currency)?;

        if fee < Decimal::ZERO || fee > command.gross_amount {
            return Err(SettleError::SettlementFailed {
                reason: format!("fee {fee} out of range for gross {}", command.gross_amount),
            });
        }
        Ok(())
    }

    /// Write a failed record for a rejected command, so the idempotency
    /// key resolves and a same-key retry replays the failure. No balance
    /// is touched and no outbox event is emitted.
    pub fn record_failure(
        &self,
        command: &SettlementCommand,
        reason: &SettleError,
    ) -> SettlementRecord {
        let now = self.clock.now();
        let mut state = self.lock();
        if let Some(existing) = state.records.get(&command.idempotency_key) {
            return existing.clone();
        }
        let record = SettlementRecord::failed(command, reason, now);
        state
            .records
            .insert(command.idempotency_key.clone(), record.clone());
        state.by_id.insert(record.id, command.idempotency_key.clone());
        record
    }

    // -----------------------------------------------------------------
    // Lookups & outbox
    // -----------------------------------------------------------------

    /// Look up a settlement record by id (the read-only collaborator API).
    #[must_use]
    pub fn record_by_id(&self, id: SettlementId) -> Option<SettlementRecord> {
        let state = self.lock();
        let key = state.by_id.get(&id)?;
        state.records.get(key).cloned()
    }

    /// Look up a settlement record by idempotency key.
    #[must_use]
    pub fn record_by_key(&self, key: &IdempotencyKey) -> Option<SettlementRecord> {
        self.lock().records.get(key).cloned()
    }

    /// Drain all pending outbox events.
    #[must_use]
    pub fn drain_events(&self) -> Vec<LedgerEvent> {
        self.lock().outbox.drain(..).collect()
    }

    /// Wait until the outbox is non-empty, then drain it.
    pub async fn wait_events(&self) -> Vec<LedgerEvent> {
        loop {
            // Arm the notification before checking, so an append between
            // check and await cannot be missed.
            let notified = self.notify.notified();
            let events = self.drain_events();
            if !events.is_empty() {
                return events;
            }
            notified.await;
        }
    }

    /// Verify per-currency conservation: the sum of all wallet balances
    /// must equal total deposits. Settlements move value, never mint it.
    pub fn verify_conservation(&self, currency: &str) -> Result<()> {
        let state = self.lock();
        let actual: Decimal = state
            .wallets
            .values()
            .filter(|wallet| wallet.currency == currency)
            .map(|wallet| wallet.balance)
            .sum();
        let expected = state
            .deposits
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if actual == expected {
            Ok(())
        } else {
            Err(SettleError::Internal(format!(
                "conservation violated for {currency}: wallets hold {actual}, deposits total {expected}"
            )))
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().expect("ledger mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use opensettle_types::{Protocol, SystemClock};

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(SystemClock))
    }

    fn funded_pair(ledger: &Ledger, payer_funds: Decimal) -> (WalletId, WalletId) {
        let payer = ledger
            .create_wallet(AccountId::new(), "USD")
            .unwrap();
        let payee = ledger
            .create_wallet(AccountId::new(), "USD")
            .unwrap();
        ledger.deposit(payer, payer_funds).unwrap();
        (payer, payee)
    }

    fn command(payer: WalletId, payee: WalletId, key: &str, amount: Decimal) -> SettlementCommand {
        let mut cmd = SettlementCommand::dummy(key, amount);
        cmd.payer = payer;
        cmd.payee = payee;
        cmd
    }

    #[test]
    fn settlement_moves_and_conserves() {
        let ledger = ledger();
        let (payer, payee) = funded_pair(&ledger, Decimal::new(5000, 2)); // 50.00

        let cmd = command(payer, payee, "k1", Decimal::new(3000, 2)); // 30.00
        let record = ledger.apply(&cmd, Decimal::new(100, 2)).unwrap(); // fee 1.00

        assert_eq!(ledger.balance(payer).unwrap(), Decimal::new(2000, 2));
        assert_eq!(ledger.balance(payee).unwrap(), Decimal::new(2900, 2));
        let platform = ledger.platform_wallet("USD");
        assert_eq!(ledger.balance(platform).unwrap(), Decimal::new(100, 2));

        assert_eq!(record.gross, record.net + record.fee);
        ledger.verify_conservation("USD").unwrap();
    }

    #[test]
    fn insufficient_balance_is_no_partial_debit() {
        let ledger = ledger();
        let (payer, payee) = funded_pair(&ledger, Decimal::new(2000, 2));

        let cmd = command(payer, payee, "k1", Decimal::new(3000, 2));
        let err = ledger.apply(&cmd, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, SettleError::InsufficientBalance { .. }));

        assert_eq!(ledger.balance(payer).unwrap(), Decimal::new(2000, 2));
        assert_eq!(ledger.balance(payee).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn frozen_payer_rejected() {
        let ledger = ledger();
        let (payer, payee) = funded_pair(&ledger, Decimal::new(5000, 2));
        ledger.set_wallet_status(payer, WalletStatus::Frozen).unwrap();

        let cmd = command(payer, payee, "k1", Decimal::new(1000, 2));
        let err = ledger.apply(&cmd, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, SettleError::WalletUnavailable { .. }));
    }

    #[test]
    fn currency_mismatch_rejected() {
        let ledger = ledger();
        let payer = ledger.create_wallet(AccountId::new(), "USD").unwrap();
        let payee = ledger.create_wallet(AccountId::new(), "BRL").unwrap();
        ledger.deposit(payer, Decimal::new(5000, 2)).unwrap();

        let cmd = command(payer, payee, "k1", Decimal::new(1000, 2));
        let err = ledger.apply(&cmd, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, SettleError::CurrencyMismatch { .. }));
    }

    #[test]
    fn self_transfer_rejected() {
        let ledger = ledger();
        let (payer, _) = funded_pair(&ledger, Decimal::new(5000, 2));
        let cmd = command(payer, payer, "k1", Decimal::new(1000, 2));
        assert!(ledger.apply(&cmd, Decimal::ZERO).is_err());
    }

    #[test]
    fn same_key_replays_without_moving_balances() {
        let ledger = ledger();
        let (payer, payee) = funded_pair(&ledger, Decimal::new(5000, 2));

        let cmd = command(payer, payee, "k1", Decimal::new(3000, 2));
        let first = ledger.apply(&cmd, Decimal::new(100, 2)).unwrap();
        let second = ledger.apply(&cmd, Decimal::new(100, 2)).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(ledger.balance(payer).unwrap(), Decimal::new(2000, 2));
    }

    #[test]
    fn failed_record_resolves_key_without_movement() {
        let ledger = ledger();
        let (payer, payee) = funded_pair(&ledger, Decimal::new(500, 2));

        let cmd = command(payer, payee, "k1", Decimal::new(3000, 2));
        let err = ledger.apply(&cmd, Decimal::ZERO).unwrap_err();
        let record = ledger.record_failure(&cmd, &err);

        assert_eq!(
            record.status,
            opensettle_types::SettlementStatus::Failed
        );
        // Replay of the failure under the same key.
        let replay = ledger.record_failure(&cmd, &err);
        assert_eq!(record.id, replay.id);
        assert_eq!(ledger.record_by_key(&cmd.idempotency_key).unwrap().id, record.id);
    }

    #[test]
    fn batch_partial_failure_preserves_order() {
        let ledger = ledger();
        let (payer, payee) = funded_pair(&ledger, Decimal::new(100_000, 2));
        let frozen = ledger.create_wallet(AccountId::new(), "USD").unwrap();
        ledger.set_wallet_status(frozen, WalletStatus::Frozen).unwrap();

        let commands: Vec<SettlementCommand> = (0..10)
            .map(|i| {
                let payee = if i == 3 { frozen } else { payee };
                command(payer, payee, &format!("batch-{i}"), Decimal::new(100, 2))
            })
            .collect();
        let items: Vec<(&SettlementCommand, Decimal)> =
            commands.iter().map(|cmd| (cmd, Decimal::ZERO)).collect();

        let results = ledger.apply_batch(&items);
        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            if i == 3 {
                assert!(matches!(
                    result,
                    Err(SettleError::WalletUnavailable { .. })
                ));
            } else {
                assert!(result.is_ok(), "command {i} should settle");
            }
        }
        // Nine settlements of 1.00 each left the payer.
        assert_eq!(ledger.balance(payer).unwrap(), Decimal::new(99_100, 2));
        ledger.verify_conservation("USD").unwrap();
    }

    #[test]
    fn outbox_event_written_with_record() {
        let ledger = ledger();
        let (payer, payee) = funded_pair(&ledger, Decimal::new(5000, 2));

        let mut cmd = command(payer, payee, "k1", Decimal::new(3000, 2));
        cmd.protocol = Protocol::Checkout;
        let record = ledger.apply(&cmd, Decimal::ZERO).unwrap();

        let events = ledger.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].record().id, record.id);
        // Drained is drained.
        assert!(ledger.drain_events().is_empty());
    }

    #[tokio::test]
    async fn wait_events_wakes_on_append() {
        let ledger = Arc::new(ledger());
        let (payer, payee) = funded_pair(&ledger, Decimal::new(5000, 2));

        let waiter = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.wait_events().await })
        };

        // Give the waiter a moment to arm, then settle.
        tokio::task::yield_now().await;
        let cmd = command(payer, payee, "k1", Decimal::new(1000, 2));
        ledger.apply(&cmd, Decimal::ZERO).unwrap();

        let events = waiter.await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn conservation_over_randomized_settlements() {
        use rand::Rng;

        let ledger = ledger();
        let mut rng = rand::thread_rng();
        let wallets: Vec<WalletId> = (0..8)
            .map(|_| {
                let id = ledger.create_wallet(AccountId::new(), "USD").unwrap();
                ledger.deposit(id, Decimal::new(1_000_000, 2)).unwrap();
                id
            })
            .collect();

        let mut settled = 0u32;
        for i in 0..10_000 {
            let payer = wallets[rng.gen_range(0..wallets.len())];
            let payee = wallets[rng.gen_range(0..wallets.len())];
            if payer == payee {
                continue;
            }
            // Random amount up to 99.99, random sub-cent precision.
            let amount = Decimal::new(rng.gen_range(1..=9999), rng.gen_range(2..=4));
            let fee = (amount * Decimal::new(1, 2)).round_dp(8);
            let cmd = command(payer, payee, &format!("r-{i}"), amount);
            if ledger.apply(&cmd, fee).is_ok() {
                settled += 1;
            }
        }

        assert!(settled > 0);
        ledger.verify_conservation("USD").unwrap();
    }
}
