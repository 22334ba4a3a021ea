//! # opensettle-gateway
//!
//! Pipeline orchestration for the OpenSettle settlement gateway.
//!
//! ## Request Pipeline
//!
//! ```text
//! RawRequest
//!   → AdapterRegistry.dispatch     (protocol tag, read once)
//!   → adapter.parse                (canonical command + proof)
//!   → IdempotencyCache.check_and_claim   (short-circuit on hit)
//!   → AuthorizationVerifier.authorize    (proof, then policy)
//!   → SettlementEngine.execute           (atomic ledger movement)
//!   → outbox relay → {PayoutBridge, WebhookDispatcher}   (async)
//! ```
//!
//! Every claimed key resolves terminally: a completed settlement or a
//! failed record with the specific rejection reason. Same-key retries
//! replay whichever outcome the first attempt reached. Rail failures
//! never travel back up this pipeline — they surface via webhook and
//! payout-status polling only.

pub mod gateway;
pub mod sandbox;

pub use gateway::SettlementGateway;
pub use sandbox::{LogOnlyTransport, SandboxHandles, sandbox_gateway};
