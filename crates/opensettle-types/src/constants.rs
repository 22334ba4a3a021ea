//! System-wide constants for the OpenSettle gateway.

/// Expected number of distinct idempotency keys the Bloom filter is sized for.
pub const DEFAULT_EXPECTED_KEYS: usize = 1_000_000;

/// Target false-positive rate for the Bloom filter (1%).
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Seconds before an unresolved in-flight idempotency claim may be re-claimed.
pub const DEFAULT_CLAIM_TTL_SECS: u64 = 30;

/// Spending-policy cache TTL in seconds. An admin policy update is not
/// guaranteed to take effect faster than one TTL window.
pub const DEFAULT_POLICY_TTL_SECS: u64 = 30;

/// Lifetime of an issued proof token in seconds (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;

/// Bounded timeout for remote proof verification in milliseconds.
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 2_000;

/// Maximum rail submission attempts before a payout is marked failed.
pub const DEFAULT_RAIL_MAX_ATTEMPTS: u32 = 5;

/// Base delay for rail retry backoff in milliseconds.
pub const DEFAULT_RAIL_BASE_BACKOFF_MS: u64 = 200;

/// Cap on rail retry backoff in milliseconds.
pub const DEFAULT_RAIL_MAX_BACKOFF_MS: u64 = 30_000;

/// Bounded timeout for a single rail submission in milliseconds.
pub const DEFAULT_RAIL_SUBMIT_TIMEOUT_MS: u64 = 5_000;

/// Maximum webhook delivery attempts before dead-lettering.
pub const DEFAULT_WEBHOOK_MAX_ATTEMPTS: u32 = 8;

/// Base delay for webhook retry backoff in milliseconds.
pub const DEFAULT_WEBHOOK_BASE_BACKOFF_MS: u64 = 500;

/// Cap on webhook retry backoff in milliseconds.
pub const DEFAULT_WEBHOOK_MAX_BACKOFF_MS: u64 = 60_000;

/// Bounded timeout for a single webhook delivery in milliseconds.
pub const DEFAULT_WEBHOOK_DELIVER_TIMEOUT_MS: u64 = 5_000;

/// Maximum commands accepted in a single batch request.
pub const MAX_BATCH_COMMANDS: usize = 10_000;

/// Maximum decimal precision for amounts (8 decimal places).
pub const AMOUNT_PRECISION: u32 = 8;
