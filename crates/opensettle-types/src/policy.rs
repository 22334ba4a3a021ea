//! Spending policy model — per-period caps for agent-managed wallets.
//!
//! A policy is a hard gate: `consumed + requested` must not exceed the
//! period cap, or the settlement is rejected with `PolicyExceeded`. The
//! amount is never silently truncated to fit.
//!
//! Policies are read-mostly. The ingress plane caches them with a short
//! TTL; consumption is written through so a cache refresh never forgets
//! what was already spent this period.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Result, SettleError, WalletId};

/// The rolling window a spending cap applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyPeriod {
    /// Cap resets every 24 hours.
    Daily,
    /// Cap resets every 7 days.
    Weekly,
    /// Cap resets every 30 days.
    Monthly,
}

impl PolicyPeriod {
    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::days(7),
            Self::Monthly => Duration::days(30),
        }
    }
}

impl std::fmt::Display for PolicyPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "DAILY"),
            Self::Weekly => write!(f, "WEEKLY"),
            Self::Monthly => write!(f, "MONTHLY"),
        }
    }
}

/// A per-wallet spending policy: a cap on total settled volume per period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingPolicy {
    /// The wallet this policy governs.
    pub wallet: WalletId,
    /// The rolling window the cap applies to.
    pub period: PolicyPeriod,
    /// Maximum total gross amount per period.
    pub period_cap: Decimal,
    /// Amount consumed so far in the current period.
    pub consumed: Decimal,
    /// When the current period started.
    pub period_start: DateTime<Utc>,
}

impl SpendingPolicy {
    /// Create a fresh policy with nothing consumed.
    #[must_use]
    pub fn new(
        wallet: WalletId,
        period: PolicyPeriod,
        period_cap: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet,
            period,
            period_cap,
            consumed: Decimal::ZERO,
            period_start: now,
        }
    }

    /// Roll the window forward if the period has elapsed, resetting
    /// consumption. Returns `true` if a reset occurred.
    pub fn roll_if_elapsed(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.period_start >= self.period.duration() {
            self.consumed = Decimal::ZERO;
            self.period_start = now;
            true
        } else {
            false
        }
    }

    /// Allowance remaining in the current period.
    #[must_use]
    pub fn remaining(&self) -> Decimal {
        (self.period_cap - self.consumed).max(Decimal::ZERO)
    }

    /// Atomically reserve `amount` against the cap.
    ///
    /// Rolls the window first if elapsed. Rejects — never truncates — when
    /// the cap would be exceeded, reporting the remaining allowance as the
    /// corrective hint.
    ///
    /// # Errors
    /// Returns [`SettleError::PolicyExceeded`] if `consumed + amount`
    /// would exceed `period_cap`.
    pub fn try_consume(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<()> {
        self.roll_if_elapsed(now);
        if self.consumed + amount > self.period_cap {
            return Err(SettleError::PolicyExceeded {
                requested: amount,
                remaining: self.remaining(),
            });
        }
        self.consumed += amount;
        Ok(())
    }

    /// Return a previously consumed amount (settlement failed downstream).
    pub fn release(&mut self, amount: Decimal) {
        self.consumed = (self.consumed - amount).max(Decimal::ZERO);
    }
}
