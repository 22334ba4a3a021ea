//! FX conversion for local-rail payouts.
//!
//! The bridge quotes the settlement currency into the corridor's local
//! currency before submitting. Rates are kept as a plain table here; a
//! production deployment feeds it from a pricing service, but the quote
//! shape (rate, converted amount, expiry) is the contract.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use opensettle_types::{Result, SettleError, constants};

/// How long a quote stays valid.
const QUOTE_TTL_SECS: i64 = 60;

/// A priced conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxQuote {
    /// Source currency.
    pub from: String,
    /// Destination (local) currency.
    pub to: String,
    /// Applied rate.
    pub rate: Decimal,
    /// Amount in the source currency.
    pub from_amount: Decimal,
    /// Converted amount in the destination currency.
    pub to_amount: Decimal,
    /// When this quote stops being honored.
    pub expires_at: DateTime<Utc>,
}

/// A currency-pair rate table.
pub struct FxTable {
    rates: RwLock<HashMap<(String, String), Decimal>>,
}

impl FxTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// A table seeded with the corridors the gateway pays out on.
    #[must_use]
    pub fn with_defaults() -> Self {
        let table = Self::new();
        table.set_rate("USD", "BRL", Decimal::new(54, 1)); // 5.4
        table.set_rate("USD", "MXN", Decimal::new(175, 1)); // 17.5
        table
    }

    /// Set (or replace) the rate for a pair.
    pub fn set_rate(&self, from: &str, to: &str, rate: Decimal) {
        let mut rates = self.rates.write().expect("fx table poisoned");
        rates.insert((from.to_string(), to.to_string()), rate);
    }

    /// Quote a conversion.
    ///
    /// # Errors
    /// Returns [`SettleError::NoFxRate`] for an unknown pair.
    pub fn quote(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<FxQuote> {
        if from == to {
            return Ok(FxQuote {
                from: from.to_string(),
                to: to.to_string(),
                rate: Decimal::ONE,
                from_amount: amount,
                to_amount: amount,
                expires_at: now + Duration::seconds(QUOTE_TTL_SECS),
            });
        }

        let rates = self.rates.read().expect("fx table poisoned");
        let rate = rates
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .ok_or_else(|| SettleError::NoFxRate {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        Ok(FxQuote {
            from: from.to_string(),
            to: to.to_string(),
            rate,
            from_amount: amount,
            to_amount: (amount * rate).round_dp(constants::AMOUNT_PRECISION),
            expires_at: now + Duration::seconds(QUOTE_TTL_SECS),
        })
    }
}

impl Default for FxTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
