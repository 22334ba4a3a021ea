//! Per-call micropayment dialect.
//!
//! Every request carries its own payment: a base64 `X-Payment` header
//! holding a payload signed by the paying agent's scheme facilitator.
//! This is the highest-volume dialect — millions of small calls — so the
//! adapter does no more than decode and envelope-check; everything
//! latency-sensitive lives behind it in the cache and verifier.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use opensettle_types::{
    PaymentProof, ProofToken, Protocol, Result, SettleError, SettlementCommand, SettlementRecord,
    SettlementStatus, TOKEN_PREFIX,
};

use crate::adapter::{ParsedSettlement, ProtocolAdapter};
use crate::request::{PAYMENT_HEADER, RawRequest, SettlementEnvelope};

/// Adapter for the per-call payment-header scheme.
pub struct PerCallAdapter;

impl ProtocolAdapter for PerCallAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::PerCall
    }

    fn parse(&self, raw: &RawRequest) -> Result<ParsedSettlement> {
        let envelope = SettlementEnvelope::from_body(&raw.body)?;

        let header = raw
            .header(PAYMENT_HEADER)
            .ok_or(SettleError::MissingPaymentHeader)?;

        // A reused settlement receipt rides in the same header slot.
        let proof = if header.starts_with(TOKEN_PREFIX) {
            PaymentProof::Receipt(ProofToken::decode(header)?)
        } else {
            // Native payload: must at least be valid base64; its inner
            // structure is the facilitator's concern, not ours.
            BASE64
                .decode(header)
                .map_err(|e| SettleError::MalformedRequest {
                    reason: format!("payment header is not base64: {e}"),
                })?;
            PaymentProof::PerCall {
                payload: header.to_string(),
            }
        };

        let command = SettlementCommand {
            idempotency_key: envelope.idempotency_key.clone().into(),
            payer: envelope.payer_ref,
            payee: envelope.payee_ref,
            gross_amount: envelope.amount,
            currency: envelope.currency.clone(),
            fee_schedule: envelope.fee_schedule_id(),
            protocol: Protocol::PerCall,
            payout: envelope.payout.clone(),
            metadata: envelope.metadata.clone(),
        };

        Ok(ParsedSettlement { command, proof })
    }

    fn format(&self, record: &SettlementRecord) -> Value {
        json!({
            "payment_id": record.id,
            "status": match record.status {
                SettlementStatus::Completed => "settled",
                SettlementStatus::Pending => "pending",
                SettlementStatus::Failed => "failed",
            },
            "amount": record.gross,
            "fee": record.fee,
            "net": record.net,
            "currency": record.currency,
            "error": record.failure,
        })
    }
}
