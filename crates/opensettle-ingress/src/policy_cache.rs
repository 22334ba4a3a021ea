//! TTL-bounded spending-policy cache with per-wallet reservation.
//!
//! Policies are read on every settlement but change rarely, so reads are
//! served from a short-TTL cache over the durable [`PolicyStore`]. An
//! administrator lowering a cap is not guaranteed to take effect faster
//! than one TTL window — an accepted staleness bound.
//!
//! Enforcement, however, is exact: reservation happens under a per-wallet
//! mutex (check-and-increment in one step), so concurrent requests can
//! never jointly overshoot the cap. Consumption is written through to the
//! store as a delta, so a cache refresh never forgets what was already
//! spent this period.
//!
//! No lock is held across an await: store calls happen before the entry
//! lock is taken or after it is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use opensettle_types::{
    Clock, PolicyCacheConfig, Result, SharedClock, SpendingPolicy, WalletId,
};

/// Durable spending-policy storage.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Fetch the policy row for a wallet. `None` means the wallet is not
    /// policy-governed.
    async fn load(&self, wallet: WalletId) -> Result<Option<SpendingPolicy>>;

    /// Durably apply a consumption delta (negative to release).
    async fn apply_delta(&self, wallet: WalletId, delta: Decimal) -> Result<()>;

    /// Durably record a period roll: consumption reset, new period start.
    async fn roll_period(&self, wallet: WalletId, period_start: DateTime<Utc>) -> Result<()>;
}

/// In-memory [`PolicyStore`] — the durable stand-in.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: Mutex<HashMap<WalletId, SpendingPolicy>>,
}

impl InMemoryPolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a wallet's policy (the administrator surface).
    pub fn upsert(&self, policy: SpendingPolicy) {
        let mut policies = self.policies.lock().expect("policy store poisoned");
        policies.insert(policy.wallet, policy);
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn load(&self, wallet: WalletId) -> Result<Option<SpendingPolicy>> {
        let policies = self.policies.lock().expect("policy store poisoned");
        Ok(policies.get(&wallet).cloned())
    }

    async fn apply_delta(&self, wallet: WalletId, delta: Decimal) -> Result<()> {
        let mut policies = self.policies.lock().expect("policy store poisoned");
        if let Some(policy) = policies.get_mut(&wallet) {
            policy.consumed = (policy.consumed + delta).max(Decimal::ZERO);
        }
        Ok(())
    }

    async fn roll_period(&self, wallet: WalletId, period_start: DateTime<Utc>) -> Result<()> {
        let mut policies = self.policies.lock().expect("policy store poisoned");
        if let Some(policy) = policies.get_mut(&wallet) {
            policy.consumed = Decimal::ZERO;
            policy.period_start = period_start;
        }
        Ok(())
    }
}

/// A cached policy: the fetch instant plus the live window under its own
/// mutex. Reservation mutates the window in one critical section.
struct PolicyEntry {
    fetched_at: DateTime<Utc>,
    window: Mutex<SpendingPolicy>,
}

/// The TTL cache over the policy store.
pub struct PolicyCache {
    store: Arc<dyn PolicyStore>,
    entries: RwLock<HashMap<WalletId, Arc<PolicyEntry>>>,
    ttl: Duration,
    clock: SharedClock,
}

impl PolicyCache {
    #[must_use]
    pub fn new(config: &PolicyCacheConfig, store: Arc<dyn PolicyStore>, clock: SharedClock) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(i64::try_from(config.ttl_secs).unwrap_or(30)),
            clock,
        }
    }

    /// The cached entry for a wallet, re-fetched past the TTL.
    /// `None` means the wallet has no policy (spending is unbounded).
    async fn entry(&self, wallet: WalletId) -> Result<Option<Arc<PolicyEntry>>> {
        let now = self.clock.now();

        // Fast path: fresh cached entry.
        {
            let entries = self.entries.read().expect("policy cache poisoned");
            if let Some(entry) = entries.get(&wallet) {
                if now - entry.fetched_at < self.ttl {
                    return Ok(Some(Arc::clone(entry)));
                }
            }
        }

        // Miss or expired: fetch with no lock held, then publish.
        let loaded = self.store.load(wallet).await?;
        let mut entries = self.entries.write().expect("policy cache poisoned");

        // A concurrent miss may have published while we were fetching; adopt
        // its entry so every reservation lands on one shared window.
        if let Some(entry) = entries.get(&wallet) {
            if now - entry.fetched_at < self.ttl {
                return Ok(Some(Arc::clone(entry)));
            }
        }

        match loaded {
            None => {
                entries.remove(&wallet);
                Ok(None)
            }
            Some(policy) => {
                debug!(wallet = %wallet, "policy cache refresh");
                let entry = Arc::new(PolicyEntry {
                    fetched_at: now,
                    window: Mutex::new(policy),
                });
                entries.insert(wallet, Arc::clone(&entry));
                Ok(Some(entry))
            }
        }
    }

    /// Atomically reserve `amount` against the wallet's cap.
    ///
    /// # Errors
    /// Returns [`opensettle_types::SettleError::PolicyExceeded`] with the
    /// remaining allowance when the cap would be overshot.
    pub async fn try_reserve(&self, wallet: WalletId, amount: Decimal) -> Result<()> {
        let Some(entry) = self.entry(wallet).await? else {
            return Ok(());
        };
        let now = self.clock.now();

        // Check-and-increment under the per-wallet lock; note whether the
        // period rolled so the store can be told afterwards.
        let rolled = {
            let mut window = entry.window.lock().expect("policy window poisoned");
            let rolled = window.roll_if_elapsed(now);
            window.try_consume(amount, now)?;
            rolled
        };

        // Write-through, outside the lock.
        if rolled {
            self.store.roll_period(wallet, now).await?;
        }
        self.store.apply_delta(wallet, amount).await
    }

    /// Return a reservation (the settlement failed downstream).
    pub async fn release(&self, wallet: WalletId, amount: Decimal) -> Result<()> {
        if let Some(entry) = self.entry(wallet).await? {
            let mut window = entry.window.lock().expect("policy window poisoned");
            window.release(amount);
        }
        self.store.apply_delta(wallet, -amount).await
    }

    /// Non-mutating policy check, for the simulation pass.
    pub async fn check(&self, wallet: WalletId, amount: Decimal) -> Result<()> {
        let Some(entry) = self.entry(wallet).await? else {
            return Ok(());
        };
        let now = self.clock.now();
        let mut probe = entry
            .window
            .lock()
            .expect("policy window poisoned")
            .clone();
        probe.try_consume(amount, now)
    }
}
