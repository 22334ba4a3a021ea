//! Token authority — issues and verifies signed settlement receipts.
//!
//! A completed settlement earns a [`ProofToken`]: an ed25519 signature
//! over `SHA-256(canonical payload)`. The token is self-contained, so a
//! later request presenting it can be verified **locally** — no round
//! trip to the issuing authority — and must reach the exact same trust
//! decision remote verification would have reached, bounded by the
//! token's stated expiry.
//!
//! Both verification paths therefore run [`TokenAuthority::authorize_spend`]:
//! the local path calls it in-process; the remote path is the same check
//! executed issuer-side.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::debug;

use opensettle_types::{
    ProofConfig, ProofToken, Result, SettleError, SettlementRecord, TokenId, WalletId,
};

/// Monotonic nonce counter for token issuance.
static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Issues settlement receipts and verifies them against its own key.
pub struct TokenAuthority {
    signing_key: SigningKey,
    token_ttl: Duration,
}

impl TokenAuthority {
    /// Build an authority around an existing signing key.
    #[must_use]
    pub fn new(signing_key: SigningKey, config: &ProofConfig) -> Self {
        Self {
            signing_key,
            token_ttl: Duration::seconds(i64::try_from(config.token_ttl_secs).unwrap_or(86_400)),
        }
    }

    /// Build an authority with a freshly generated key.
    #[must_use]
    pub fn generate(config: &ProofConfig) -> Self {
        let mut rng = rand::rngs::OsRng;
        Self::new(SigningKey::generate(&mut rng), config)
    }

    /// The public key external verifiers check receipts against.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The verification key as hex, for config files and discovery
    /// documents external verifiers read.
    #[must_use]
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.verifying_key().as_bytes())
    }

    /// Issue a receipt for a completed settlement, authorizing later
    /// spends from the payer wallet up to the settled gross amount.
    #[must_use]
    pub fn issue(&self, record: &SettlementRecord, now: DateTime<Utc>) -> ProofToken {
        let mut token = ProofToken {
            id: TokenId::new(),
            settlement_id: record.id,
            wallet: record.payer,
            amount_limit: record.gross,
            currency: record.currency.clone(),
            issued_at: now,
            expires_at: now + self.token_ttl,
            nonce: NONCE_COUNTER.fetch_add(1, Ordering::Relaxed),
            signature: Vec::new(),
        };
        let digest = Sha256::digest(token.signing_payload());
        token.signature = self.signing_key.sign(&digest).to_bytes().to_vec();
        debug!(token = %token.id, settlement = %record.id, "issued proof token");
        token
    }

    /// Verify a token's signature and expiry. The shared core of both
    /// verification paths.
    ///
    /// Check order is fixed — signature, then expiry — so the two paths
    /// cannot disagree on which rejection a bad-and-expired token gets.
    pub fn verify(&self, token: &ProofToken, now: DateTime<Utc>) -> Result<()> {
        let sig_bytes: [u8; 64] = token
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| SettleError::ProofSignatureInvalid)?;
        let signature = Signature::from_bytes(&sig_bytes);
        let digest = Sha256::digest(token.signing_payload());
        self.verifying_key()
            .verify(&digest, &signature)
            .map_err(|_| SettleError::ProofSignatureInvalid)?;

        if token.is_expired(now) {
            return Err(SettleError::ProofExpired);
        }
        Ok(())
    }

    /// Full trust decision for a spend presented with this token:
    /// signature, expiry, wallet binding, currency binding, amount limit.
    pub fn authorize_spend(
        &self,
        token: &ProofToken,
        payer: WalletId,
        amount: Decimal,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.verify(token, now)?;

        if token.wallet != payer {
            return Err(SettleError::InvalidProof {
                reason: format!("token bound to {}, request pays from {payer}", token.wallet),
            });
        }
        if token.currency != currency {
            return Err(SettleError::InvalidProof {
                reason: format!(
                    "token denominated in {}, request in {currency}",
                    token.currency
                ),
            });
        }
        if amount > token.amount_limit {
            return Err(SettleError::ProofOverLimit {
                amount,
                limit: token.amount_limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use opensettle_types::SettlementCommand;

    fn authority() -> TokenAuthority {
        TokenAuthority::generate(&ProofConfig::default())
    }

    fn completed_record(amount: Decimal) -> SettlementRecord {
        let cmd = SettlementCommand::dummy("k1", amount);
        SettlementRecord::completed(&cmd, Decimal::ZERO, Utc::now())
    }

    #[test]
    fn issued_token_verifies() {
        let authority = authority();
        let record = completed_record(Decimal::new(3000, 2));
        let now = Utc::now();

        let token = authority.issue(&record, now);
        authority.verify(&token, now).unwrap();
    }

    #[test]
    fn tampered_amount_fails_signature() {
        let authority = authority();
        let record = completed_record(Decimal::new(3000, 2));
        let now = Utc::now();

        let mut token = authority.issue(&record, now);
        token.amount_limit = Decimal::new(1_000_000, 2);

        let err = authority.verify(&token, now).unwrap_err();
        assert!(matches!(err, SettleError::ProofSignatureInvalid));
    }

    #[test]
    fn foreign_key_fails_signature() {
        let ours = authority();
        let theirs = authority();
        let record = completed_record(Decimal::new(3000, 2));
        let now = Utc::now();

        let token = theirs.issue(&record, now);
        assert!(matches!(
            ours.verify(&token, now),
            Err(SettleError::ProofSignatureInvalid)
        ));
    }

    #[test]
    fn expiry_is_a_hard_boundary() {
        let authority = authority();
        let record = completed_record(Decimal::new(3000, 2));
        let now = Utc::now();
        let token = authority.issue(&record, now);

        // Valid exactly at expiry, rejected one second past it.
        authority.verify(&token, token.expires_at).unwrap();
        let err = authority
            .verify(&token, token.expires_at + Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, SettleError::ProofExpired));
    }

    #[test]
    fn authorize_spend_enforces_bindings() {
        let authority = authority();
        let record = completed_record(Decimal::new(5000, 2));
        let now = Utc::now();
        let token = authority.issue(&record, now);

        // Within limit, right wallet and currency.
        authority
            .authorize_spend(&token, record.payer, Decimal::new(5000, 2), "USD", now)
            .unwrap();

        // Wrong wallet.
        assert!(matches!(
            authority.authorize_spend(&token, WalletId::new(), Decimal::ONE, "USD", now),
            Err(SettleError::InvalidProof { .. })
        ));

        // Wrong currency.
        assert!(matches!(
            authority.authorize_spend(&token, record.payer, Decimal::ONE, "BRL", now),
            Err(SettleError::InvalidProof { .. })
        ));

        // Over the limit.
        assert!(matches!(
            authority.authorize_spend(&token, record.payer, Decimal::new(5001, 2), "USD", now),
            Err(SettleError::ProofOverLimit { .. })
        ));
    }

    #[test]
    fn verifying_key_hex_is_stable() {
        let authority = authority();
        let hex_key = authority.verifying_key_hex();
        assert_eq!(hex_key.len(), 64);
        assert_eq!(hex_key, authority.verifying_key_hex());
    }

    #[test]
    fn nonces_are_unique_per_issue() {
        let authority = authority();
        let record = completed_record(Decimal::new(3000, 2));
        let now = Utc::now();
        let a = authority.issue(&record, now);
        let b = authority.issue(&record, now);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn wire_roundtrip_still_verifies() {
        let authority = authority();
        let record = completed_record(Decimal::new(3000, 2));
        let now = Utc::now();
        let token = authority.issue(&record, now);

        let decoded = ProofToken::decode(&token.encode()).unwrap();
        authority.verify(&decoded, now).unwrap();
    }
}
