//! Fee schedules — basis points plus a flat component.
//!
//! Fees are computed on the gross amount and credited to the platform
//! wallet; the payee receives `gross - fee`. Conservation holds exactly
//! whatever the schedule says, because the fee is subtracted, never
//! re-derived.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use opensettle_types::{FeeScheduleId, Result, SettleError, constants};

/// One fee schedule: `fee = round(gross * bps / 10_000) + flat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Schedule identifier referenced by settlement commands.
    pub id: FeeScheduleId,
    /// Proportional component in basis points (100 = 1%).
    pub percent_bps: u32,
    /// Flat component added per settlement.
    pub flat: Decimal,
}

impl FeeSchedule {
    #[must_use]
    pub fn new(id: FeeScheduleId, percent_bps: u32, flat: Decimal) -> Self {
        Self {
            id,
            percent_bps,
            flat,
        }
    }

    /// The default schedule: 1% proportional, no flat component.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(FeeScheduleId::standard(), 100, Decimal::ZERO)
    }

    /// A zero-fee schedule, for internal transfers.
    #[must_use]
    pub fn free() -> Self {
        Self::new(FeeScheduleId::new("free"), 0, Decimal::ZERO)
    }

    /// Compute the fee for a gross amount.
    #[must_use]
    pub fn fee_for(&self, gross: Decimal) -> Decimal {
        let proportional = (gross * Decimal::from(self.percent_bps) / Decimal::new(10_000, 0))
            .round_dp(constants::AMOUNT_PRECISION);
        proportional + self.flat
    }
}

/// Registry of fee schedules known to the engine.
pub struct FeeBook {
    schedules: HashMap<FeeScheduleId, FeeSchedule>,
}

impl FeeBook {
    /// An empty book.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schedules: HashMap::new(),
        }
    }

    /// A book seeded with the `standard` and `free` schedules.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut book = Self::new();
        book.register(FeeSchedule::standard());
        book.register(FeeSchedule::free());
        book
    }

    /// Register a schedule under its own id.
    pub fn register(&mut self, schedule: FeeSchedule) {
        self.schedules.insert(schedule.id.clone(), schedule);
    }

    /// Compute the fee a command owes.
    ///
    /// # Errors
    /// Returns [`SettleError::Configuration`] for an unknown schedule id —
    /// fail-closed rather than guessing a rate.
    pub fn fee_for(&self, id: &FeeScheduleId, gross: Decimal) -> Result<Decimal> {
        self.schedules
            .get(id)
            .map(|schedule| schedule.fee_for(gross))
            .ok_or_else(|| SettleError::Configuration(format!("unknown fee schedule {id}")))
    }
}

impl Default for FeeBook {
    fn default() -> Self {
        Self::with_defaults()
    }
}
