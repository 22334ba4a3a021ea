//! Settlement record — the persisted outcome of a canonical command.
//!
//! One record per unique idempotency key, enforced by the ledger.
//! Status transitions are **monotonic**: `Completed` and `Failed` are
//! terminal; a record never moves from `Completed` back to `Pending`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Currency, IdempotencyKey, Protocol, Result, SettleError, SettlementCommand, SettlementId,
    WalletId,
};

/// The lifecycle state of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    /// Accepted but not yet applied to the ledger.
    Pending,
    /// Ledger movement applied. **Irreversible.**
    Completed,
    /// Rejected or failed; no balance was moved. Terminal.
    Failed,
}

impl SettlementStatus {
    /// Can this status transition to the given target?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Completed | Self::Failed)
        )
    }

    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Persisted outcome of a settlement command.
///
/// For a completed record the conservation invariant holds exactly:
/// `gross == net + fee`, the payer was debited `gross`, the payee
/// credited `net`, and the platform wallet credited `fee`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Globally unique settlement identifier.
    pub id: SettlementId,
    /// The idempotency key this record is the unique outcome of.
    pub idempotency_key: IdempotencyKey,
    /// Wallet that was (or would have been) debited.
    pub payer: WalletId,
    /// Wallet that was (or would have been) credited.
    pub payee: WalletId,
    /// Gross amount moved.
    pub gross: Decimal,
    /// Fee retained by the platform wallet.
    pub fee: Decimal,
    /// Net amount credited to the payee (`gross - fee`).
    pub net: Decimal,
    /// Settlement currency.
    pub currency: Currency,
    /// The dialect the originating request arrived in.
    pub protocol: Protocol,
    /// Lifecycle status.
    pub status: SettlementStatus,
    /// The specific rejection reason, for failed records.
    pub failure: Option<String>,
    /// When the command was accepted.
    pub created_at: DateTime<Utc>,
    /// When the ledger movement completed, for completed records.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SettlementRecord {
    /// Build a completed record from a command and the computed fee.
    #[must_use]
    pub fn completed(command: &SettlementCommand, fee: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: SettlementId::new(),
            idempotency_key: command.idempotency_key.clone(),
            payer: command.payer,
            payee: command.payee,
            gross: command.gross_amount,
            fee,
            net: command.gross_amount - fee,
            currency: command.currency.clone(),
            protocol: command.protocol,
            status: SettlementStatus::Completed,
            failure: None,
            created_at: now,
            completed_at: Some(now),
        }
    }

    /// Build a failed record carrying the specific rejection reason.
    /// No balance was moved.
    #[must_use]
    pub fn failed(command: &SettlementCommand, reason: &SettleError, now: DateTime<Utc>) -> Self {
        Self {
            id: SettlementId::new(),
            idempotency_key: command.idempotency_key.clone(),
            payer: command.payer,
            payee: command.payee,
            gross: command.gross_amount,
            fee: Decimal::ZERO,
            net: Decimal::ZERO,
            currency: command.currency.clone(),
            protocol: command.protocol,
            status: SettlementStatus::Failed,
            failure: Some(reason.to_string()),
            created_at: now,
            completed_at: None,
        }
    }

    /// Guard a status transition.
    ///
    /// # Errors
    /// Returns `SettlementFailed` if the transition is not allowed
    /// (terminal statuses never move).
    pub fn transition(&mut self, target: SettlementStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(SettleError::SettlementFailed {
                reason: format!(
                    "Cannot transition settlement {} from {} to {target}",
                    self.id, self.status
                ),
            });
        }
        self.status = target;
        Ok(())
    }
}
