//! Configuration types for the OpenSettle gateway.

use serde::{Deserialize, Serialize};

use crate::constants;

/// Top-level gateway configuration, one section per plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Idempotency cache sizing and claim lifetime.
    pub idempotency: IdempotencyConfig,
    /// Spending-policy cache.
    pub policy: PolicyCacheConfig,
    /// Proof tokens and remote verification.
    pub proof: ProofConfig,
    /// Local rail bridge retry behavior.
    pub rail: RailConfig,
    /// Webhook dispatcher retry behavior.
    pub webhook: WebhookConfig,
}

/// Idempotency cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// Number of distinct keys the Bloom filter is sized for.
    pub expected_keys: usize,
    /// Target false-positive rate (e.g. 0.01 for 1%).
    pub false_positive_rate: f64,
    /// Seconds before an unresolved in-flight claim may be re-claimed.
    pub claim_ttl_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            expected_keys: constants::DEFAULT_EXPECTED_KEYS,
            false_positive_rate: constants::DEFAULT_FALSE_POSITIVE_RATE,
            claim_ttl_secs: constants::DEFAULT_CLAIM_TTL_SECS,
        }
    }
}

/// Spending-policy cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCacheConfig {
    /// Cache TTL in seconds. Policy updates take up to one TTL to appear —
    /// an accepted staleness bound, not a bug.
    pub ttl_secs: u64,
}

impl Default for PolicyCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: constants::DEFAULT_POLICY_TTL_SECS,
        }
    }
}

/// Proof token and verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    /// Lifetime of issued proof tokens in seconds.
    pub token_ttl_secs: u64,
    /// Bounded timeout for remote proof verification in milliseconds.
    pub verify_timeout_ms: u64,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: constants::DEFAULT_TOKEN_TTL_SECS,
            verify_timeout_ms: constants::DEFAULT_VERIFY_TIMEOUT_MS,
        }
    }
}

/// Local rail bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailConfig {
    /// Maximum submission attempts before the payout is marked failed.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds; doubles per attempt.
    pub base_backoff_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_backoff_ms: u64,
    /// Bounded timeout per submission in milliseconds.
    pub submit_timeout_ms: u64,
}

impl Default for RailConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RAIL_MAX_ATTEMPTS,
            base_backoff_ms: constants::DEFAULT_RAIL_BASE_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_RAIL_MAX_BACKOFF_MS,
            submit_timeout_ms: constants::DEFAULT_RAIL_SUBMIT_TIMEOUT_MS,
        }
    }
}

/// Webhook dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Maximum delivery attempts before dead-lettering.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds; doubles per attempt.
    pub base_backoff_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_backoff_ms: u64,
    /// Bounded timeout per delivery in milliseconds.
    pub deliver_timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_WEBHOOK_MAX_ATTEMPTS,
            base_backoff_ms: constants::DEFAULT_WEBHOOK_BASE_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_WEBHOOK_MAX_BACKOFF_MS,
            deliver_timeout_ms: constants::DEFAULT_WEBHOOK_DELIVER_TIMEOUT_MS,
        }
    }
}
