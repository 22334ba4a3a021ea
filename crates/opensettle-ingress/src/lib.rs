//! # opensettle-ingress
//!
//! **Admission Plane**: everything a request must clear before it may
//! touch the ledger.
//!
//! ## Architecture
//!
//! 1. **[`IdempotencyCache`]**: two-tier duplicate detection — a lock-free
//!    Bloom filter in front of a durable claim store
//! 2. **[`TokenAuthority`]**: issues and locally verifies ed25519-signed
//!    settlement receipts
//! 3. **[`AuthorizationVerifier`]**: proof verification (remote or local)
//!    followed by the spending-policy gate
//! 4. **[`PolicyCache`]**: TTL-bounded cache over the policy store with
//!    per-wallet reservation
//!
//! ## Request Flow
//!
//! ```text
//! Adapter → IdempotencyCache.check_and_claim() → AuthorizationVerifier.authorize()
//!         → SettlementEngine (ledger plane)
//! ```
//!
//! No request reaches the engine without holding an idempotency claim and
//! a policy reservation.

pub mod bloom;
pub mod idempotency;
pub mod policy_cache;
pub mod token;
pub mod verifier;

pub use bloom::BloomFilter;
pub use idempotency::{
    ClaimOutcome, ClaimState, IdempotencyCache, IdempotencyStore, InMemoryIdempotencyStore,
};
pub use policy_cache::{InMemoryPolicyStore, PolicyCache, PolicyStore};
pub use token::TokenAuthority;
pub use verifier::{AuthorizationVerifier, InProcessIssuer, IssuerClient};
