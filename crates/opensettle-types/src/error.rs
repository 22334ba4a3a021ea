//! Error types for the OpenSettle settlement gateway.
//!
//! All errors use the `OS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Protocol / parse errors
//! - 2xx: Wallet / balance errors
//! - 3xx: Proof / authorization errors
//! - 4xx: Spending policy errors
//! - 5xx: Idempotency errors
//! - 6xx: Settlement errors
//! - 7xx: Rail / payout errors
//! - 8xx: Webhook errors
//! - 9xx: General / internal errors
//!
//! Rejections carry the specific cause and, where applicable, the corrective
//! hint (e.g. the remaining policy allowance) — never an opaque generic error.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{SettlementId, WalletId, WalletStatus};

/// Central error enum for all OpenSettle operations.
#[derive(Debug, Error)]
pub enum SettleError {
    // =================================================================
    // Protocol / Parse Errors (1xx)
    // =================================================================
    /// No adapter is registered for the request's protocol tag.
    #[error("OS_ERR_100: Unknown protocol tag: {tag}")]
    UnknownProtocol { tag: String },

    /// The request body or headers failed protocol-specific parsing.
    #[error("OS_ERR_101: Malformed request: {reason}")]
    MalformedRequest { reason: String },

    /// The per-call payment header is missing from the request.
    #[error("OS_ERR_102: Missing payment header")]
    MissingPaymentHeader,

    /// The commerce order's line-item total does not match the charged amount.
    #[error("OS_ERR_103: Order total {order_total} does not match charged amount {charged}")]
    OrderTotalMismatch {
        order_total: Decimal,
        charged: Decimal,
    },

    // =================================================================
    // Wallet / Balance Errors (2xx)
    // =================================================================
    /// Not enough balance to cover the gross amount. No partial debit occurs.
    #[error("OS_ERR_200: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// The wallet exists but is frozen or closed.
    #[error("OS_ERR_201: Wallet {wallet} unavailable: status {status}")]
    WalletUnavailable {
        wallet: WalletId,
        status: WalletStatus,
    },

    /// The referenced wallet does not exist.
    #[error("OS_ERR_202: Wallet not found: {0}")]
    WalletNotFound(WalletId),

    /// The command currency does not match the wallet currency.
    #[error("OS_ERR_203: Currency mismatch for wallet {wallet}: expected {expected}, got {got}")]
    CurrencyMismatch {
        wallet: WalletId,
        expected: String,
        got: String,
    },

    // =================================================================
    // Proof / Authorization Errors (3xx)
    // =================================================================
    /// The payment proof failed verification (signature, credential, issuer).
    #[error("OS_ERR_300: Invalid proof: {reason}")]
    InvalidProof { reason: String },

    /// The proof token has passed its stated expiry.
    #[error("OS_ERR_301: Proof token expired")]
    ProofExpired,

    /// The ed25519 signature on the proof token didn't verify.
    #[error("OS_ERR_302: Proof token signature verification failed")]
    ProofSignatureInvalid,

    /// The requested amount exceeds the proof token's authorized limit.
    #[error("OS_ERR_303: Amount {amount} exceeds proof authorization limit {limit}")]
    ProofOverLimit { amount: Decimal, limit: Decimal },

    /// Remote proof verification exceeded its bounded timeout. Retryable.
    #[error("OS_ERR_304: Proof verification timed out after {timeout_ms}ms")]
    VerificationTimeout { timeout_ms: u64 },

    /// The issuing authority could not be reached. Retryable.
    #[error("OS_ERR_305: Issuer unavailable: {reason}")]
    IssuerUnavailable { reason: String },

    // =================================================================
    // Spending Policy Errors (4xx)
    // =================================================================
    /// The spending policy period cap would be exceeded. The amount is never
    /// silently truncated; the caller may retry with at most `remaining`.
    #[error(
        "OS_ERR_400: Spending policy exceeded: requested {requested}, \
         reduce amount to remaining policy allowance: {remaining}"
    )]
    PolicyExceeded {
        requested: Decimal,
        remaining: Decimal,
    },

    // =================================================================
    // Idempotency Errors (5xx)
    // =================================================================
    /// Another request with the same idempotency key is currently executing.
    /// Not a failure — the caller should retry shortly or poll.
    #[error("OS_ERR_500: Duplicate request in flight; retry shortly")]
    DuplicateInFlight,

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// Settlement execution failed for a reason outside the taxonomy above.
    #[error("OS_ERR_600: Settlement failed: {reason}")]
    SettlementFailed { reason: String },

    /// No settlement record exists for this identifier.
    #[error("OS_ERR_601: Settlement not found: {0}")]
    SettlementNotFound(SettlementId),

    // =================================================================
    // Rail / Payout Errors (7xx)
    // =================================================================
    /// The external rail could not be reached. Transient; retried with backoff.
    #[error("OS_ERR_700: Rail unreachable: {reason}")]
    RailUnreachable { reason: String },

    /// The external rail permanently rejected the instruction
    /// (e.g. invalid destination account). Never retried.
    #[error("OS_ERR_701: Rail rejected instruction: {reason}")]
    RailRejected { reason: String },

    /// No rail adapter serves the destination's corridor.
    #[error("OS_ERR_702: No rail configured for corridor {corridor}")]
    UnsupportedCorridor { corridor: String },

    /// No FX quote is available for the requested currency pair.
    #[error("OS_ERR_703: No FX rate for {from}->{to}")]
    NoFxRate { from: String, to: String },

    // =================================================================
    // Webhook Errors (8xx)
    // =================================================================
    /// A webhook delivery attempt failed. Retried internally.
    #[error("OS_ERR_800: Webhook delivery failed: {reason}")]
    WebhookDeliveryFailed { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("OS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("OS_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config, missing fields, etc.).
    #[error("OS_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("OS_ERR_903: I/O error: {0}")]
    Io(String),
}

impl SettleError {
    /// Whether a retry of the same request may succeed without any change.
    ///
    /// Transient conditions (in-flight duplicates, timeouts, unreachable
    /// collaborators) are retryable; validation and policy failures are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateInFlight
                | Self::VerificationTimeout { .. }
                | Self::IssuerUnavailable { .. }
                | Self::RailUnreachable { .. }
                | Self::WebhookDeliveryFailed { .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SettleError>;

// Conversion from std::io::Error
impl From<std::io::Error> for SettleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SettleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
