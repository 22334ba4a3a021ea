//! Payment proofs — the authorization artifact each dialect carries.
//!
//! Adapters extract the proof bytes their protocol defines; the
//! authorization verifier decides how to check them:
//!
//! - First-time credentials are verified **remotely** with the issuing
//!   authority.
//! - A [`ProofToken`] — a signed receipt this gateway itself issued for a
//!   prior settlement — is verified **locally** (signature + expiry), with
//!   no network call. Local verification must produce byte-identical trust
//!   decisions to remote verification, bounded by the token's expiry.
//!
//! ## Token Wire Format
//!
//! `ost1.<base64url(JSON)>` — the JSON is the serialized token including
//! its ed25519 signature over `SHA-256(signing_payload)`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, MandateId, Result, SettleError, SettlementId, TokenId, WalletId};

/// Signing scheme identifier embedded in issued tokens.
pub const TOKEN_SIGNING_SCHEME: &str = "ed25519-sha256-v1";

/// Wire prefix for encoded proof tokens.
pub const TOKEN_PREFIX: &str = "ost1.";

/// The proof a settlement request carries, by dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PaymentProof {
    /// Per-call dialect: the signed payment header payload, base64 as
    /// received. Verified remotely with the scheme's facilitator.
    PerCall { payload: String },
    /// Mandate dialect: a pre-issued credential drawing on a mandate.
    Mandate {
        mandate_id: MandateId,
        credential: String,
    },
    /// Checkout dialect: the opaque settlement token acquired earlier.
    Checkout { token: String },
    /// Commerce dialect: the shared payment token for the order.
    Commerce { shared_token: String },
    /// A prior settlement's signed receipt, reused as authorization.
    /// The only variant eligible for local verification.
    Receipt(ProofToken),
}

impl PaymentProof {
    /// Short label for structured logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PerCall { .. } => "percall",
            Self::Mandate { .. } => "mandate",
            Self::Checkout { .. } => "checkout",
            Self::Commerce { .. } => "commerce",
            Self::Receipt(_) => "receipt",
        }
    }
}

/// A signed settlement receipt, acceptable as authorization for a later
/// request (e.g. a retry) without a round trip to the issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofToken {
    /// Globally unique token identifier.
    pub id: TokenId,
    /// The settlement this receipt attests to.
    pub settlement_id: SettlementId,
    /// The payer wallet the token authorizes spending from.
    pub wallet: WalletId,
    /// Maximum amount a settlement presenting this token may move.
    pub amount_limit: Decimal,
    /// Currency of the limit.
    pub currency: Currency,
    /// When the token was issued.
    pub issued_at: DateTime<Utc>,
    /// Hard expiry. Local and remote verification both reject after this.
    pub expires_at: DateTime<Utc>,
    /// Unique nonce to prevent replay of the signing payload.
    pub nonce: u64,
    /// Ed25519 signature over `SHA-256(signing_payload)`.
    pub signature: Vec<u8>,
}

impl ProofToken {
    /// Canonical signing payload.
    ///
    /// Format: `"opensettle:receipt:v1:" || id || settlement_id || wallet
    /// || amount_limit || currency || expires_at_rfc3339 || nonce`
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(256);
        payload.extend_from_slice(b"opensettle:receipt:v1:");
        payload.extend_from_slice(self.id.0.as_bytes());
        payload.extend_from_slice(self.settlement_id.0.as_bytes());
        payload.extend_from_slice(self.wallet.0.as_bytes());
        payload.extend_from_slice(self.amount_limit.to_string().as_bytes());
        payload.extend_from_slice(self.currency.as_bytes());
        payload.extend_from_slice(self.expires_at.to_rfc3339().as_bytes());
        payload.extend_from_slice(&self.nonce.to_le_bytes());
        payload
    }

    /// Returns `true` if this token has passed its expiry at `now`.
    ///
    /// Takes the evaluation instant explicitly so callers drive it from the
    /// injected clock; expiry decisions are then reproducible in tests.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Encode for the wire: `ost1.<base64url(JSON)>`.
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("ProofToken serialization cannot fail");
        format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a wire token.
    ///
    /// # Errors
    /// Returns [`SettleError::InvalidProof`] on a bad prefix, bad base64,
    /// or malformed JSON.
    pub fn decode(wire: &str) -> Result<Self> {
        let b64 = wire
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| SettleError::InvalidProof {
                reason: format!("token missing {TOKEN_PREFIX} prefix"),
            })?;
        let bytes = URL_SAFE_NO_PAD
            .decode(b64)
            .map_err(|e| SettleError::InvalidProof {
                reason: format!("token base64 invalid: {e}"),
            })?;
        serde_json::from_slice(&bytes).map_err(|e| SettleError::InvalidProof {
            reason: format!("token payload invalid: {e}"),
        })
    }
}

/// Dummy token for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl ProofToken {
    /// Create an unsigned dummy token expiring one hour from `now`.
    pub fn dummy(wallet: WalletId, limit: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: TokenId::new(),
            settlement_id: SettlementId::new(),
            wallet,
            amount_limit: limit,
            currency: "USD".to_string(),
            issued_at: now,
            expires_at: now + chrono::Duration::hours(1),
            nonce: rand::random::<u64>(),
            signature: vec![0u8; 64],
        }
    }
}
