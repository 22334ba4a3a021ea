//! Wire-level request and response shapes (§6 of the gateway contract).
//!
//! Every dialect shares the generic settlement-request envelope; the
//! dialect-specific material rides in the `proof` field or a header.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use opensettle_types::{
    FeeScheduleId, PayoutRequest, Result, SettleError, SettlementId, SettlementRecord,
    SettlementStatus, WalletId,
};

/// Header naming the protocol dialect.
pub const PROTOCOL_HEADER: &str = "x-settlement-protocol";

/// Header carrying the per-call payment payload.
pub const PAYMENT_HEADER: &str = "x-payment";

/// A raw inbound request: headers plus a JSON body, before any dialect
/// has interpreted it.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// Header map. Keys are stored lowercase.
    headers: HashMap<String, String>,
    /// JSON body.
    pub body: Value,
}

impl RawRequest {
    /// Build a request from a JSON body.
    #[must_use]
    pub fn new(body: Value) -> Self {
        Self {
            headers: HashMap::new(),
            body,
        }
    }

    /// Attach a header (name matched case-insensitively on lookup).
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Look up a header by name, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The protocol tag: `X-Settlement-Protocol` header first, body
    /// `protocol` field second. Read once by the dispatch layer.
    #[must_use]
    pub fn protocol_tag(&self) -> Option<&str> {
        self.header(PROTOCOL_HEADER)
            .or_else(|| self.body.get("protocol").and_then(Value::as_str))
    }
}

/// The generic settlement-request envelope shared by every dialect.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementEnvelope {
    /// Redundant with the dispatch tag; ignored after dispatch.
    #[serde(default)]
    pub protocol: Option<String>,
    /// Caller-supplied idempotency key.
    pub idempotency_key: String,
    /// Wallet to debit.
    pub payer_ref: WalletId,
    /// Wallet to credit.
    pub payee_ref: WalletId,
    /// Gross amount.
    pub amount: Decimal,
    /// Settlement currency.
    pub currency: String,
    /// Dialect-specific proof material (per-call carries it in a header).
    #[serde(default)]
    pub proof: Value,
    /// Optional fee schedule override.
    #[serde(default)]
    pub fee_schedule: Option<String>,
    /// Optional local-rail payout.
    #[serde(default)]
    pub payout: Option<PayoutRequest>,
    /// Opaque caller metadata.
    #[serde(default)]
    pub metadata: Value,
}

impl SettlementEnvelope {
    /// Deserialize the shared envelope out of a raw body and validate the
    /// fields every dialect agrees on.
    pub fn from_body(body: &Value) -> Result<Self> {
        let envelope: Self =
            serde_json::from_value(body.clone()).map_err(|e| SettleError::MalformedRequest {
                reason: format!("settlement envelope: {e}"),
            })?;
        if envelope.amount <= Decimal::ZERO {
            return Err(SettleError::MalformedRequest {
                reason: format!("amount must be positive, got {}", envelope.amount),
            });
        }
        if envelope.idempotency_key.is_empty() {
            return Err(SettleError::MalformedRequest {
                reason: "idempotency_key must not be empty".to_string(),
            });
        }
        Ok(envelope)
    }

    /// The fee schedule to apply: the override, or the standard schedule.
    #[must_use]
    pub fn fee_schedule_id(&self) -> FeeScheduleId {
        self.fee_schedule
            .as_deref()
            .map_or_else(FeeScheduleId::standard, FeeScheduleId::new)
    }
}

/// Settlement response returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResponse {
    /// The unique settlement identifier.
    pub settlement_id: SettlementId,
    /// Terminal status of the settlement.
    pub status: SettlementStatus,
    /// Gross amount moved (or that would have moved).
    pub gross_amount: Decimal,
    /// Fee retained by the platform.
    pub fee_amount: Decimal,
    /// Net amount credited to the payee.
    pub net_amount: Decimal,
    /// The specific failure reason, for failed settlements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Signed receipt acceptable as authorization for a later request
    /// via local verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_token: Option<String>,
}

impl SettlementResponse {
    /// Build a response from a settlement record, attaching the issued
    /// receipt when present.
    #[must_use]
    pub fn from_record(record: &SettlementRecord, proof_token: Option<String>) -> Self {
        Self {
            settlement_id: record.id,
            status: record.status,
            gross_amount: record.gross,
            fee_amount: record.fee,
            net_amount: record.net,
            failure: record.failure.clone(),
            proof_token,
        }
    }
}

/// Result of a side-effect-free simulation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    /// The request would settle if submitted.
    WouldComplete,
    /// The request would be rejected.
    WouldFail,
}

impl std::fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WouldComplete => write!(f, "would_complete"),
            Self::WouldFail => write!(f, "would_fail"),
        }
    }
}

/// Simulation outcome: the settlement-response shape with `would_*`
/// statuses and the specific rejection reason where applicable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutcome {
    /// Would the settlement complete?
    pub status: SimulationStatus,
    /// The specific rejection reason, if it would fail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Gross amount that would move.
    pub gross_amount: Decimal,
    /// Fee that would be retained.
    pub fee_amount: Decimal,
    /// Net amount that would be credited.
    pub net_amount: Decimal,
}

/// A batch of settlement requests sharing one logical batch id.
#[derive(Debug, Default)]
pub struct BatchRequest {
    /// Caller-supplied batch identifier, carried through logging.
    pub batch_id: String,
    /// The requests, in execution order.
    pub requests: Vec<RawRequest>,
}

/// Per-item outcome of a batch, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum BatchItemOutcome {
    /// The item settled (or replayed an earlier settlement).
    Settled(SettlementResponse),
    /// The item was rejected with the specific reason.
    Rejected { reason: String },
}

impl BatchItemOutcome {
    /// Whether this item completed successfully.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Settled(SettlementResponse {
                status: SettlementStatus::Completed,
                ..
            })
        )
    }
}
