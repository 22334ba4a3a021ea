//! Payout model — the local-rail leg of a settlement.
//!
//! A payout is an **independent state machine** linked to its settlement
//! by reference. The ledger movement and the payout are separately
//! recoverable: a permanently failed payout never reverses the completed
//! settlement; the pair is surfaced for audit instead.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ submit  ┌───────────┐ rail ok  ┌───────────┐
//!   │ PENDING ├────────▶│ SUBMITTED ├─────────▶│ COMPLETED │
//!   └────┬────┘         └─────┬─────┘          └───────────┘
//!        │ no corridor        │ rejected / retries exhausted
//!        ▼                    ▼
//!   ┌────────┐            ┌────────┐
//!   │ FAILED │            │ FAILED │
//!   └────────┘            └────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, PayoutId, Result, SettleError, SettlementId};

/// A local-currency rail corridor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corridor {
    /// Brazilian instant payments (BRL).
    Pix,
    /// Mexican interbank transfers (MXN).
    Spei,
}

impl Corridor {
    /// The local currency this corridor pays out in.
    #[must_use]
    pub fn local_currency(&self) -> &'static str {
        match self {
            Self::Pix => "BRL",
            Self::Spei => "MXN",
        }
    }
}

impl std::fmt::Display for Corridor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pix => write!(f, "pix"),
            Self::Spei => write!(f, "spei"),
        }
    }
}

/// Destination account reference on a local rail.
///
/// The variant determines the corridor: a Pix key routes through Pix,
/// a CLABE through SPEI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RailDestination {
    /// A Pix recipient (key + key type + legal name).
    Pix {
        pix_key: String,
        pix_key_type: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tax_id: Option<String>,
    },
    /// A SPEI recipient (18-digit CLABE + legal name).
    Spei {
        clabe: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rfc: Option<String>,
    },
}

impl RailDestination {
    /// The corridor this destination routes through.
    #[must_use]
    pub fn corridor(&self) -> Corridor {
        match self {
            Self::Pix { .. } => Corridor::Pix,
            Self::Spei { .. } => Corridor::Spei,
        }
    }
}

/// A settlement command's request to bridge the net amount to a local rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    /// Where the funds go on the local rail.
    pub destination: RailDestination,
}

/// The lifecycle state of a payout instruction.
///
/// Transitions are **monotonic**: `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    /// Created; not yet handed to a rail adapter.
    Pending,
    /// Handed to the rail at least once; may still be retried.
    Submitted,
    /// The rail confirmed the payout. Terminal.
    Completed,
    /// Permanently rejected or retries exhausted. Terminal.
    /// The linked settlement record is **not** reversed.
    Failed,
}

impl PayoutStatus {
    /// Can this status transition to the given target?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Submitted | Self::Failed)
                | (Self::Submitted, Self::Completed | Self::Failed)
        )
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A payout instruction produced by the rail bridge after a settlement
/// completes. Tracks its external lifecycle independently of the
/// settlement record, and keeps enough of an attempt trail to audit the
/// ledger-completed/payout-failed case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutInstruction {
    /// Globally unique payout identifier.
    pub id: PayoutId,
    /// The completed settlement this payout bridges. Link, not ownership:
    /// this record's status never flows back into the settlement.
    pub settlement_id: SettlementId,
    /// The corridor the destination routes through.
    pub corridor: Corridor,
    /// Destination account reference.
    pub destination: RailDestination,
    /// Net settlement amount, in the settlement currency.
    pub source_amount: Decimal,
    /// Converted amount delivered on the rail.
    pub local_amount: Decimal,
    /// Local rail currency.
    pub local_currency: Currency,
    /// FX rate applied (`local_amount = source_amount * fx_rate`).
    pub fx_rate: Decimal,
    /// External reference assigned by the rail, once submitted.
    pub external_ref: Option<String>,
    /// Lifecycle status.
    pub status: PayoutStatus,
    /// Number of submission attempts so far.
    pub attempts: u32,
    /// The most recent rail error, for the audit trail.
    pub last_error: Option<String>,
    /// When the instruction was created.
    pub created_at: DateTime<Utc>,
    /// Last status or attempt change.
    pub updated_at: DateTime<Utc>,
}

impl PayoutInstruction {
    /// Guard a status transition.
    ///
    /// # Errors
    /// Returns `RailRejected` if the transition is not allowed (terminal
    /// statuses never move).
    pub fn transition(&mut self, target: PayoutStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(SettleError::RailRejected {
                reason: format!(
                    "Cannot transition payout {} from {} to {target}",
                    self.id, self.status
                ),
            });
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pix_destination() -> RailDestination {
        RailDestination::Pix {
            pix_key: "maria@email.com".to_string(),
            pix_key_type: "email".to_string(),
            name: "Maria Silva".to_string(),
            tax_id: None,
        }
    }

    fn instruction() -> PayoutInstruction {
        let now = Utc::now();
        PayoutInstruction {
            id: PayoutId::new(),
            settlement_id: SettlementId::new(),
            corridor: Corridor::Pix,
            destination: pix_destination(),
            source_amount: Decimal::new(2900, 2),
            local_amount: Decimal::new(14500, 2),
            local_currency: "BRL".to_string(),
            fx_rate: Decimal::new(5, 0),
            external_ref: None,
            status: PayoutStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn destination_selects_corridor() {
        assert_eq!(pix_destination().corridor(), Corridor::Pix);
        let spei = RailDestination::Spei {
            clabe: "002010077777777771".to_string(),
            name: "Juan Perez".to_string(),
            rfc: None,
        };
        assert_eq!(spei.corridor(), Corridor::Spei);
    }

    #[test]
    fn corridor_local_currency() {
        assert_eq!(Corridor::Pix.local_currency(), "BRL");
        assert_eq!(Corridor::Spei.local_currency(), "MXN");
    }

    #[test]
    fn status_transitions_valid() {
        assert!(PayoutStatus::Pending.can_transition_to(PayoutStatus::Submitted));
        assert!(PayoutStatus::Pending.can_transition_to(PayoutStatus::Failed));
        assert!(PayoutStatus::Submitted.can_transition_to(PayoutStatus::Completed));
        assert!(PayoutStatus::Submitted.can_transition_to(PayoutStatus::Failed));
    }

    #[test]
    fn terminal_statuses_never_move() {
        assert!(!PayoutStatus::Completed.can_transition_to(PayoutStatus::Failed));
        assert!(!PayoutStatus::Failed.can_transition_to(PayoutStatus::Submitted));
        assert!(!PayoutStatus::Completed.can_transition_to(PayoutStatus::Pending));
    }

    #[test]
    fn transition_guard() {
        let mut p = instruction();
        let now = Utc::now();
        p.transition(PayoutStatus::Submitted, now).unwrap();
        p.transition(PayoutStatus::Completed, now).unwrap();
        assert!(p.transition(PayoutStatus::Failed, now).is_err());
    }

    #[test]
    fn destination_serde_uses_type_tag() {
        let json = serde_json::to_value(pix_destination()).unwrap();
        assert_eq!(json["type"], "pix");
        assert_eq!(json["pix_key"], "maria@email.com");
        // Absent optional fields are omitted, matching the wire format.
        assert!(json.get("tax_id").is_none());
    }

    #[test]
    fn instruction_serde_roundtrip() {
        let p = instruction();
        let json = serde_json::to_string(&p).unwrap();
        let back: PayoutInstruction = serde_json::from_str(&json).unwrap();
        assert_eq!(p.id, back.id);
        assert_eq!(p.local_amount, back.local_amount);
        assert_eq!(p.status, back.status);
    }
}
