//! The settlement engine — fee resolution plus atomic ledger application.
//!
//! The engine assumes its input is **authorized**: proof verification and
//! policy reservation happened in the admission plane. Its own job is
//! exactly-once execution per command.

use std::sync::Arc;

use rust_decimal::Decimal;

use opensettle_types::{Result, SettleError, SettlementCommand, SettlementRecord};

use crate::fees::FeeBook;
use crate::ledger::Ledger;

/// Executes authorized settlement commands against the ledger.
pub struct SettlementEngine {
    ledger: Arc<Ledger>,
    fees: FeeBook,
}

impl SettlementEngine {
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, fees: FeeBook) -> Self {
        Self { ledger, fees }
    }

    /// The ledger this engine executes against.
    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Execute one authorized command: resolve the fee, apply atomically.
    pub fn execute(&self, command: &SettlementCommand) -> Result<SettlementRecord> {
        let fee = self
            .fees
            .fee_for(&command.fee_schedule, command.gross_amount)?;
        self.ledger.apply(command, fee)
    }

    /// Execute a batch sharing one ledger round trip.
    ///
    /// Per-command outcomes in input order; a failure in command *i* does
    /// not abort commands *i+1..n*.
    pub fn execute_batch(&self, commands: &[SettlementCommand]) -> Vec<Result<SettlementRecord>> {
        // Resolve fees first; a bad schedule fails only its own item.
        let fees: Vec<Result<Decimal>> = commands
            .iter()
            .map(|command| {
                self.fees
                    .fee_for(&command.fee_schedule, command.gross_amount)
            })
            .collect();

        let batch: Vec<(&SettlementCommand, Decimal)> = commands
            .iter()
            .zip(&fees)
            .filter_map(|(command, fee)| fee.as_ref().ok().map(|fee| (command, *fee)))
            .collect();
        let mut applied = self.ledger.apply_batch(&batch).into_iter();

        fees.into_iter()
            .map(|fee| match fee {
                Ok(_) => applied
                    .next()
                    .unwrap_or_else(|| Err(SettleError::Internal("batch underrun".to_string()))),
                Err(err) => Err(err),
            })
            .collect()
    }

    /// Resolve the fee a command would pay, without touching the ledger.
    pub fn quote_fee(&self, command: &SettlementCommand) -> Result<Decimal> {
        self.fees
            .fee_for(&command.fee_schedule, command.gross_amount)
    }

    /// Validate a command end to end without mutating anything, returning
    /// the fee that would apply.
    pub fn simulate(&self, command: &SettlementCommand) -> Result<Decimal> {
        let fee = self
            .fees
            .fee_for(&command.fee_schedule, command.gross_amount)?;
        self.ledger.check(command, fee)?;
        Ok(fee)
    }

    /// Record a rejection as a failed settlement so the idempotency key
    /// resolves terminally.
    pub fn record_failure(
        &self,
        command: &SettlementCommand,
        reason: &SettleError,
    ) -> SettlementRecord {
        self.ledger.record_failure(command, reason)
    }
}
