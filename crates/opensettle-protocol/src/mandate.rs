//! Mandate / authorization-credential dialect.
//!
//! The paying agent holds a pre-issued mandate — an authorization
//! permitting future payments up to a ceiling — and each settlement
//! presents the mandate id plus a single-use credential drawn on it.
//! The issuing authority checks the credential is valid and unspent;
//! this adapter only extracts it.

use serde::Deserialize;
use serde_json::{Value, json};

use opensettle_types::{
    MandateId, PaymentProof, ProofToken, Protocol, Result, SettleError, SettlementCommand,
    SettlementRecord, SettlementStatus, TOKEN_PREFIX,
};

use crate::adapter::{ParsedSettlement, ProtocolAdapter};
use crate::request::{RawRequest, SettlementEnvelope};

/// Adapter for the mandate/credential scheme.
pub struct MandateAdapter;

#[derive(Debug, Deserialize)]
struct MandateProofWire {
    mandate_id: MandateId,
    credential: String,
}

impl ProtocolAdapter for MandateAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Mandate
    }

    fn parse(&self, raw: &RawRequest) -> Result<ParsedSettlement> {
        let envelope = SettlementEnvelope::from_body(&raw.body)?;

        let wire: MandateProofWire = serde_json::from_value(envelope.proof.clone())
            .map_err(|e| SettleError::MalformedRequest {
                reason: format!("mandate proof: {e}"),
            })?;
        if wire.credential.is_empty() {
            return Err(SettleError::MalformedRequest {
                reason: "mandate credential must not be empty".to_string(),
            });
        }

        let proof = if wire.credential.starts_with(TOKEN_PREFIX) {
            PaymentProof::Receipt(ProofToken::decode(&wire.credential)?)
        } else {
            PaymentProof::Mandate {
                mandate_id: wire.mandate_id,
                credential: wire.credential,
            }
        };

        let command = SettlementCommand {
            idempotency_key: envelope.idempotency_key.clone().into(),
            payer: envelope.payer_ref,
            payee: envelope.payee_ref,
            gross_amount: envelope.amount,
            currency: envelope.currency.clone(),
            fee_schedule: envelope.fee_schedule_id(),
            protocol: Protocol::Mandate,
            payout: envelope.payout.clone(),
            metadata: envelope.metadata.clone(),
        };

        Ok(ParsedSettlement { command, proof })
    }

    fn format(&self, record: &SettlementRecord) -> Value {
        json!({
            "settlement_id": record.id,
            "mandate_status": match record.status {
                SettlementStatus::Completed => "executed",
                SettlementStatus::Pending => "accepted",
                SettlementStatus::Failed => "declined",
            },
            "charged": record.gross,
            "fee": record.fee,
            "net": record.net,
            "currency": record.currency,
            "decline_reason": record.failure,
        })
    }
}
