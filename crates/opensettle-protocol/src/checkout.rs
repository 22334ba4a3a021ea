//! Checkout-token dialect.
//!
//! The caller acquires an opaque settlement token ahead of time (quote,
//! recipient, and corridor are bound into it by the token service) and
//! presents just the token at settlement. Response vocabulary follows the
//! token service's `from_amount`/`fees` naming.

use serde::Deserialize;
use serde_json::{Value, json};

use opensettle_types::{
    PaymentProof, Protocol, Result, SettleError, SettlementCommand, SettlementRecord,
    SettlementStatus,
};

use crate::adapter::{ParsedSettlement, ProtocolAdapter, receipt_or};
use crate::request::{RawRequest, SettlementEnvelope};

/// Adapter for the checkout-token scheme.
pub struct CheckoutAdapter;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CheckoutProofWire {
    /// `"proof": {"token": "..."}`
    Object { token: String },
    /// `"proof": "..."` — bare token string.
    Bare(String),
}

impl ProtocolAdapter for CheckoutAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Checkout
    }

    fn parse(&self, raw: &RawRequest) -> Result<ParsedSettlement> {
        let envelope = SettlementEnvelope::from_body(&raw.body)?;

        let wire: CheckoutProofWire = serde_json::from_value(envelope.proof.clone())
            .map_err(|e| SettleError::MalformedRequest {
                reason: format!("checkout proof: {e}"),
            })?;
        let token = match wire {
            CheckoutProofWire::Object { token } | CheckoutProofWire::Bare(token) => token,
        };
        if token.is_empty() {
            return Err(SettleError::MalformedRequest {
                reason: "checkout token must not be empty".to_string(),
            });
        }

        let proof = receipt_or(&token, |t| PaymentProof::Checkout { token: t })?;

        let command = SettlementCommand {
            idempotency_key: envelope.idempotency_key.clone().into(),
            payer: envelope.payer_ref,
            payee: envelope.payee_ref,
            gross_amount: envelope.amount,
            currency: envelope.currency.clone(),
            fee_schedule: envelope.fee_schedule_id(),
            protocol: Protocol::Checkout,
            payout: envelope.payout.clone(),
            metadata: envelope.metadata.clone(),
        };

        Ok(ParsedSettlement { command, proof })
    }

    fn format(&self, record: &SettlementRecord) -> Value {
        json!({
            "settlement_id": record.id,
            "status": match record.status {
                SettlementStatus::Completed => "completed",
                SettlementStatus::Pending => "processing",
                SettlementStatus::Failed => "failed",
            },
            "from_amount": record.gross,
            "fees": record.fee,
            "net_amount": record.net,
            "currency": record.currency,
            "failure_reason": record.failure,
        })
    }
}
