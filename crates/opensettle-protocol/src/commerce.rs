//! Commerce-lifecycle dialect.
//!
//! The heaviest wire format: a full order object travels with the
//! settlement. The adapter reconciles the order's line items against the
//! charged amount before anything reaches the verifier — a mismatched
//! cart is a parse error, not a settlement failure.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use opensettle_types::{
    PaymentProof, Protocol, Result, SettleError, SettlementCommand, SettlementRecord,
    SettlementStatus,
};

use crate::adapter::{ParsedSettlement, ProtocolAdapter, receipt_or};
use crate::request::{RawRequest, SettlementEnvelope};

/// Adapter for the commerce-lifecycle scheme.
pub struct CommerceAdapter;

#[derive(Debug, Deserialize)]
struct OrderWire {
    order_id: String,
    line_items: Vec<LineItemWire>,
    total: Decimal,
}

#[derive(Debug, Deserialize)]
struct LineItemWire {
    #[allow(dead_code)]
    name: String,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct CommerceProofWire {
    shared_token: String,
}

impl ProtocolAdapter for CommerceAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Commerce
    }

    fn parse(&self, raw: &RawRequest) -> Result<ParsedSettlement> {
        let envelope = SettlementEnvelope::from_body(&raw.body)?;

        let order: OrderWire = serde_json::from_value(
            raw.body.get("order").cloned().unwrap_or(Value::Null),
        )
        .map_err(|e| SettleError::MalformedRequest {
            reason: format!("commerce order: {e}"),
        })?;

        // The cart must reconcile: line items sum to the order total, and
        // the order total is what gets charged.
        let items_total: Decimal = order.line_items.iter().map(|item| item.amount).sum();
        if items_total != order.total {
            return Err(SettleError::OrderTotalMismatch {
                order_total: order.total,
                charged: items_total,
            });
        }
        if order.total != envelope.amount {
            return Err(SettleError::OrderTotalMismatch {
                order_total: order.total,
                charged: envelope.amount,
            });
        }

        let wire: CommerceProofWire = serde_json::from_value(envelope.proof.clone())
            .map_err(|e| SettleError::MalformedRequest {
                reason: format!("commerce proof: {e}"),
            })?;
        let proof = receipt_or(&wire.shared_token, |t| PaymentProof::Commerce {
            shared_token: t,
        })?;

        // Carry the order reference through to records and webhooks.
        let mut metadata = envelope.metadata.clone();
        if metadata.is_null() {
            metadata = json!({});
        }
        if let Some(map) = metadata.as_object_mut() {
            map.insert("order_id".to_string(), json!(order.order_id));
        }

        let command = SettlementCommand {
            idempotency_key: envelope.idempotency_key.clone().into(),
            payer: envelope.payer_ref,
            payee: envelope.payee_ref,
            gross_amount: envelope.amount,
            currency: envelope.currency.clone(),
            fee_schedule: envelope.fee_schedule_id(),
            protocol: Protocol::Commerce,
            payout: envelope.payout.clone(),
            metadata,
        };

        Ok(ParsedSettlement { command, proof })
    }

    fn format(&self, record: &SettlementRecord) -> Value {
        json!({
            "order_settlement": {
                "settlement_id": record.id,
                "state": match record.status {
                    SettlementStatus::Completed => "captured",
                    SettlementStatus::Pending => "authorized",
                    SettlementStatus::Failed => "failed",
                },
                "gross": record.gross,
                "fee": record.fee,
                "net": record.net,
                "currency": record.currency,
                "failure": record.failure,
            }
        })
    }
}
