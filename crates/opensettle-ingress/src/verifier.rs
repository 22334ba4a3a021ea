//! Authorization verifier — proof validity, then the spending-policy gate.
//!
//! Two verification modes:
//!
//! - **Remote**: first-time credentials go to the [`IssuerClient`] under a
//!   bounded timeout. A timeout surfaces as a retryable error, never a
//!   silent hang.
//! - **Local**: a [`ProofToken`](opensettle_types::ProofToken) receipt is
//!   checked in-process against the [`TokenAuthority`] — the deliberate
//!   latency optimization for retries and repeat spends.
//!
//! Order is fixed and fail-closed: no policy reservation happens until the
//! proof is trusted, and nothing reaches the engine without both.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use opensettle_types::{
    Clock, PaymentProof, ProofConfig, Result, SettleError, SettlementCommand, SharedClock, WalletId,
};

use crate::policy_cache::PolicyCache;
use crate::token::TokenAuthority;

/// Port to the authority that issued a first-time proof.
///
/// Implementations confirm the credential is valid **and unspent**; the
/// gateway never re-derives that decision itself.
#[async_trait]
pub trait IssuerClient: Send + Sync {
    /// Verify a first-time proof for the given command.
    async fn verify(&self, proof: &PaymentProof, command: &SettlementCommand) -> Result<()>;
}

/// In-process [`IssuerClient`] backed by a registered-credential set and
/// the shared [`TokenAuthority`] — the stand-in for each scheme's real
/// facilitator service.
pub struct InProcessIssuer {
    authority: Arc<TokenAuthority>,
    credentials: Mutex<std::collections::HashSet<String>>,
    clock: SharedClock,
}

impl InProcessIssuer {
    #[must_use]
    pub fn new(authority: Arc<TokenAuthority>, clock: SharedClock) -> Self {
        Self {
            authority,
            credentials: Mutex::new(std::collections::HashSet::new()),
            clock,
        }
    }

    /// Register a credential the issuer will accept.
    pub fn register_credential(&self, credential: impl Into<String>) {
        let mut credentials = self.credentials.lock().expect("issuer poisoned");
        credentials.insert(credential.into());
    }

    fn check_registered(&self, credential: &str, kind: &str) -> Result<()> {
        let credentials = self.credentials.lock().expect("issuer poisoned");
        if credentials.contains(credential) {
            Ok(())
        } else {
            Err(SettleError::InvalidProof {
                reason: format!("{kind} credential not recognized by issuer"),
            })
        }
    }
}

#[async_trait]
impl IssuerClient for InProcessIssuer {
    async fn verify(&self, proof: &PaymentProof, command: &SettlementCommand) -> Result<()> {
        match proof {
            PaymentProof::PerCall { payload } => self.check_registered(payload, "per-call"),
            PaymentProof::Mandate { credential, .. } => {
                self.check_registered(credential, "mandate")
            }
            PaymentProof::Checkout { token } => self.check_registered(token, "checkout"),
            PaymentProof::Commerce { shared_token } => {
                self.check_registered(shared_token, "commerce")
            }
            // Receipts sent down the remote path run the exact check the
            // local path runs — the equivalence the receipt design promises.
            PaymentProof::Receipt(token) => self.authority.authorize_spend(
                token,
                command.payer,
                command.gross_amount,
                &command.currency,
                self.clock.now(),
            ),
        }
    }
}

/// The verifier: proof validity first, spending policy second.
pub struct AuthorizationVerifier {
    authority: Arc<TokenAuthority>,
    issuer: Arc<dyn IssuerClient>,
    policies: Arc<PolicyCache>,
    verify_timeout: StdDuration,
    clock: SharedClock,
}

impl AuthorizationVerifier {
    #[must_use]
    pub fn new(
        config: &ProofConfig,
        authority: Arc<TokenAuthority>,
        issuer: Arc<dyn IssuerClient>,
        policies: Arc<PolicyCache>,
        clock: SharedClock,
    ) -> Self {
        Self {
            authority,
            issuer,
            policies,
            verify_timeout: StdDuration::from_millis(config.verify_timeout_ms),
            clock,
        }
    }

    /// Verify the proof and reserve the amount against the payer's policy.
    ///
    /// On success the caller owns a policy reservation and must release it
    /// via [`release_policy`](Self::release_policy) if the settlement
    /// fails downstream.
    pub async fn authorize(&self, command: &SettlementCommand, proof: &PaymentProof) -> Result<()> {
        self.verify_proof(command, proof).await?;
        self.policies
            .try_reserve(command.payer, command.gross_amount)
            .await
    }

    /// Proof validity only — no policy mutation. Used by the simulate pass
    /// together with [`check_policy`](Self::check_policy).
    pub async fn verify_proof(
        &self,
        command: &SettlementCommand,
        proof: &PaymentProof,
    ) -> Result<()> {
        match proof {
            PaymentProof::Receipt(token) => {
                // Local verification: no network, same trust decision.
                debug!(token = %token.id, "verifying receipt locally");
                self.authority.authorize_spend(
                    token,
                    command.payer,
                    command.gross_amount,
                    &command.currency,
                    self.clock.now(),
                )
            }
            first_time => {
                let timeout_ms = u64::try_from(self.verify_timeout.as_millis()).unwrap_or(u64::MAX);
                match tokio::time::timeout(
                    self.verify_timeout,
                    self.issuer.verify(first_time, command),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(kind = first_time.kind(), "proof verification timed out");
                        Err(SettleError::VerificationTimeout { timeout_ms })
                    }
                }
            }
        }
    }

    /// Non-mutating policy check, for the simulate pass.
    pub async fn check_policy(&self, wallet: WalletId, amount: Decimal) -> Result<()> {
        self.policies.check(wallet, amount).await
    }

    /// Return a policy reservation after a downstream failure.
    pub async fn release_policy(&self, wallet: WalletId, amount: Decimal) -> Result<()> {
        self.policies.release(wallet, amount).await
    }
}
