//! Wallet model for the OpenSettle ledger.
//!
//! A wallet holds a single-currency balance as a fixed-point [`Decimal`].
//! Balances are mutated only inside the ledger's atomic critical section;
//! a balance change and its causing settlement record are written together
//! or not at all.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AgentId, Currency, Result, SettleError, WalletId};

/// Lifecycle status of a wallet.
///
/// `Frozen` wallets may be thawed back to `Active`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletStatus {
    /// Wallet can be debited and credited.
    Active,
    /// Administratively frozen; no settlement may touch it.
    Frozen,
    /// Permanently closed. Terminal.
    Closed,
}

impl WalletStatus {
    /// Can this status transition to the given target status?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Active, Self::Frozen | Self::Closed) | (Self::Frozen, Self::Active | Self::Closed)
        )
    }
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Frozen => write!(f, "FROZEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// A ledger-tracked wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Globally unique wallet identifier.
    pub id: WalletId,
    /// The entity that owns this wallet.
    pub owner: AccountId,
    /// Currency this wallet is denominated in (e.g. "USD").
    pub currency: Currency,
    /// Current balance. Fixed-point decimal, never floating-point.
    pub balance: Decimal,
    /// Lifecycle status.
    pub status: WalletStatus,
    /// The managing agent, if this wallet is agent-operated. The agent's
    /// spending policy is looked up by wallet id.
    pub agent: Option<AgentId>,
}

impl Wallet {
    /// Create a new active wallet with a zero balance.
    #[must_use]
    pub fn new(owner: AccountId, currency: impl Into<Currency>) -> Self {
        Self {
            id: WalletId::new(),
            owner,
            currency: currency.into(),
            balance: Decimal::ZERO,
            status: WalletStatus::Active,
            agent: None,
        }
    }

    /// Whether settlements may debit or credit this wallet right now.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        self.status == WalletStatus::Active
    }

    /// Guard a settlement touching this wallet. Returns
    /// [`SettleError::WalletUnavailable`] for frozen or closed wallets.
    pub fn ensure_operational(&self) -> Result<()> {
        if self.is_operational() {
            Ok(())
        } else {
            Err(SettleError::WalletUnavailable {
                wallet: self.id,
                status: self.status,
            })
        }
    }

    /// Guard the command currency against the wallet currency.
    pub fn ensure_currency(&self, currency: &str) -> Result<()> {
        if self.currency == currency {
            Ok(())
        } else {
            Err(SettleError::CurrencyMismatch {
                wallet: self.id,
                expected: self.currency.clone(),
                got: currency.to_string(),
            })
        }
    }

    /// Attempt a status transition.
    ///
    /// # Errors
    /// Returns `WalletUnavailable` if the transition is not allowed
    /// (e.g. reopening a closed wallet).
    pub fn set_status(&mut self, target: WalletStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(SettleError::WalletUnavailable {
                wallet: self.id,
                status: self.status,
            });
        }
        self.status = target;
        Ok(())
    }
}

/// Dummy wallet for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Wallet {
    /// Create a dummy active wallet with the given balance.
    pub fn dummy(currency: &str, balance: Decimal) -> Self {
        Self {
            id: WalletId::new(),
            owner: AccountId::new(),
            currency: currency.to_string(),
            balance,
            status: WalletStatus::Active,
            agent: None,
        }
    }
}
