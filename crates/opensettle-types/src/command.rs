//! Canonical settlement command — the protocol-agnostic form every
//! dialect adapter parses into.
//!
//! One execution path: whatever wire format a request arrived in, the
//! engine only ever sees a [`SettlementCommand`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, IdempotencyKey, PayoutRequest, WalletId};

/// The protocol dialect a request arrived in.
///
/// Dispatch selects one adapter by this tag, exactly once per request.
/// Adding a dialect means adding one adapter implementation — the engine,
/// the idempotency cache, and the other adapters never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Per-call micropayment: one signed payment header per request.
    PerCall,
    /// Pre-issued mandate credential authorizing payments up to a ceiling.
    Mandate,
    /// Opaque checkout token acquired ahead of settlement.
    Checkout,
    /// Full commerce lifecycle: order object with reconciled line items.
    Commerce,
}

impl Protocol {
    /// The wire tag carried in `X-Settlement-Protocol` or the body's
    /// `protocol` field.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PerCall => "percall",
            Self::Mandate => "mandate",
            Self::Checkout => "checkout",
            Self::Commerce => "commerce",
        }
    }

    /// Parse a wire tag. Returns `None` for unknown tags — the dispatch
    /// layer maps that to `UnknownProtocol`, never to adapter probing.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "percall" => Some(Self::PerCall),
            "mandate" => Some(Self::Mandate),
            "checkout" => Some(Self::Checkout),
            "commerce" => Some(Self::Commerce),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Identifier for a fee schedule registered with the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeeScheduleId(pub String);

impl FeeScheduleId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The schedule applied when a request names none.
    #[must_use]
    pub fn standard() -> Self {
        Self("standard".to_string())
    }
}

impl std::fmt::Display for FeeScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fee:{}", self.0)
    }
}

/// The canonical, protocol-agnostic settlement command.
///
/// Produced by a protocol adapter; consumed by the idempotency cache,
/// the authorization verifier, and the settlement engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementCommand {
    /// Caller-supplied idempotency key. At most one record per key.
    pub idempotency_key: IdempotencyKey,
    /// Wallet to debit.
    pub payer: WalletId,
    /// Wallet to credit (net of fee).
    pub payee: WalletId,
    /// Gross amount to move, in `currency`.
    pub gross_amount: Decimal,
    /// Settlement currency.
    pub currency: Currency,
    /// Which fee schedule applies.
    pub fee_schedule: FeeScheduleId,
    /// The dialect that produced this command.
    pub protocol: Protocol,
    /// Optional local-rail payout to bridge after the ledger movement.
    pub payout: Option<PayoutRequest>,
    /// Opaque caller metadata, carried through to records and webhooks.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Dummy command for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl SettlementCommand {
    /// Create a dummy per-call command between two fresh wallet ids.
    pub fn dummy(key: &str, amount: Decimal) -> Self {
        Self {
            idempotency_key: IdempotencyKey::new(key),
            payer: WalletId::new(),
            payee: WalletId::new(),
            gross_amount: amount,
            currency: "USD".to_string(),
            fee_schedule: FeeScheduleId::standard(),
            protocol: Protocol::PerCall,
            payout: None,
            metadata: serde_json::Value::Null,
        }
    }
}
