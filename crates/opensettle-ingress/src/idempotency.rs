//! Two-tier idempotency cache — duplicate suppression before the ledger.
//!
//! Tier 1 is a lock-free [`BloomFilter`]: "definitely new" keys skip the
//! durable lookup entirely. Tier 2 is the authoritative
//! [`IdempotencyStore`], where claiming a key is an insert-if-absent —
//! the step that guarantees at most one engine execution per key even
//! under concurrent duplicates.
//!
//! Claims resolve to a terminal record on both success and failure, so a
//! duplicate of a failed request replays the failure. An in-flight claim
//! older than the claim TTL is treated as abandoned (crashed worker) and
//! may be re-claimed.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use opensettle_types::{
    Clock, IdempotencyConfig, IdempotencyKey, Result, SettlementRecord, SharedClock,
};

use crate::bloom::BloomFilter;

/// The durable state held for a claimed key.
#[derive(Debug, Clone)]
pub enum ClaimState {
    /// A request holds the claim and is executing.
    InFlight {
        /// When the claim was taken; used for abandonment detection.
        claimed_at: DateTime<Utc>,
    },
    /// The key has a terminal settlement record.
    Resolved(SettlementRecord),
}

/// Outcome of [`IdempotencyCache::check_and_claim`].
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The key is new and this caller now holds the claim. Proceed.
    New,
    /// Another request with this key is executing. Retry shortly.
    DuplicateInFlight,
    /// The key already has a terminal record. Replay it; touch nothing.
    DuplicateResolved(Box<SettlementRecord>),
}

/// Durable, authoritative key→claim storage.
///
/// `try_claim` must be atomic insert-if-absent: of N concurrent calls for
/// one absent key, exactly one receives [`ClaimOutcome::New`].
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Authoritative read of a key's claim state.
    async fn lookup(&self, key: &IdempotencyKey) -> Result<Option<ClaimState>>;

    /// Atomically claim the key. In-flight claims older than `claim_ttl`
    /// are abandoned and re-claimable.
    async fn try_claim(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<ClaimOutcome>;

    /// Resolve a held claim with its terminal record.
    async fn resolve(&self, key: &IdempotencyKey, record: SettlementRecord) -> Result<()>;
}

/// In-memory [`IdempotencyStore`]. The durable stand-in for a database
/// table with a unique index on the idempotency key.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    claims: Mutex<HashMap<IdempotencyKey, ClaimState>>,
}

impl InMemoryIdempotencyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn lookup(&self, key: &IdempotencyKey) -> Result<Option<ClaimState>> {
        let claims = self.claims.lock().expect("idempotency store poisoned");
        Ok(claims.get(key).cloned())
    }

    async fn try_claim(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<ClaimOutcome> {
        let mut claims = self.claims.lock().expect("idempotency store poisoned");
        let abandoned = match claims.get(key) {
            Some(ClaimState::Resolved(record)) => {
                return Ok(ClaimOutcome::DuplicateResolved(Box::new(record.clone())));
            }
            Some(ClaimState::InFlight { claimed_at }) if now - *claimed_at < claim_ttl => {
                return Ok(ClaimOutcome::DuplicateInFlight);
            }
            // Absent, or an abandoned claim from a crashed worker.
            existing => existing.is_some(),
        };
        if abandoned {
            warn!(%key, "re-claiming abandoned in-flight idempotency claim");
        }
        claims.insert(key.clone(), ClaimState::InFlight { claimed_at: now });
        Ok(ClaimOutcome::New)
    }

    async fn resolve(&self, key: &IdempotencyKey, record: SettlementRecord) -> Result<()> {
        let mut claims = self.claims.lock().expect("idempotency store poisoned");
        claims.insert(key.clone(), ClaimState::Resolved(record));
        Ok(())
    }
}

/// The two-tier cache: Bloom filter in front of the durable store.
pub struct IdempotencyCache {
    bloom: BloomFilter,
    store: std::sync::Arc<dyn IdempotencyStore>,
    claim_ttl: Duration,
    clock: SharedClock,
}

impl IdempotencyCache {
    /// Build the cache over a durable store, sizing the Bloom filter from
    /// configuration.
    #[must_use]
    pub fn new(
        config: &IdempotencyConfig,
        store: std::sync::Arc<dyn IdempotencyStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            bloom: BloomFilter::with_rate(config.expected_keys, config.false_positive_rate),
            store,
            claim_ttl: Duration::seconds(i64::try_from(config.claim_ttl_secs).unwrap_or(30)),
            clock,
        }
    }

    /// Check a key and claim it if new.
    ///
    /// `New` means this caller holds the claim and **must** later call
    /// [`resolve`](Self::resolve). `DuplicateInFlight` is a retry-shortly
    /// signal, not an error. `DuplicateResolved` carries the record to
    /// replay.
    pub async fn check_and_claim(&self, key: &IdempotencyKey) -> Result<ClaimOutcome> {
        let now = self.clock.now();

        // Tier 1: a miss here proves the key was never claimed, so the
        // authoritative read can be skipped — go straight to the claim.
        if self.bloom.contains(key.as_bytes()) {
            // Possible duplicate (or a false positive): authoritative read.
            match self.store.lookup(key).await? {
                Some(ClaimState::Resolved(record)) => {
                    debug!(%key, "idempotency hit: resolved");
                    return Ok(ClaimOutcome::DuplicateResolved(Box::new(record)));
                }
                Some(ClaimState::InFlight { claimed_at })
                    if now - claimed_at < self.claim_ttl =>
                {
                    debug!(%key, "idempotency hit: in flight");
                    return Ok(ClaimOutcome::DuplicateInFlight);
                }
                // False positive or abandoned claim: claim below.
                _ => {}
            }
        }

        let outcome = self.store.try_claim(key, now, self.claim_ttl).await?;
        if matches!(outcome, ClaimOutcome::New) {
            // Admit immediately so subsequent duplicates short-circuit
            // without a durable lookup.
            self.bloom.insert(key.as_bytes());
        }
        Ok(outcome)
    }

    /// Resolve a held claim with the terminal record.
    pub async fn resolve(&self, key: &IdempotencyKey, record: SettlementRecord) -> Result<()> {
        self.store.resolve(key, record).await
    }

    /// Authoritative lookup, bypassing the Bloom tier.
    pub async fn lookup(&self, key: &IdempotencyKey) -> Result<Option<ClaimState>> {
        self.store.lookup(key).await
    }
}
