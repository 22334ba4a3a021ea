//! # opensettle-protocol
//!
//! **Dialect Plane**: four incompatible agentic-payment wire formats
//! converging on one canonical [`SettlementCommand`](opensettle_types::SettlementCommand).
//!
//! ## Architecture
//!
//! Each dialect implements [`ProtocolAdapter`]:
//! 1. `parse(RawRequest)` → canonical command + payment proof
//! 2. `format(SettlementRecord)` → protocol-specific response
//!
//! The [`AdapterRegistry`] selects an adapter by the protocol tag
//! (`X-Settlement-Protocol` header or body `protocol` field) exactly once
//! per request — never by trying adapters in sequence. Adding a fifth
//! dialect means adding one adapter implementation and one registration;
//! the engine, the idempotency cache, and the other adapters never change.
//!
//! ## Dialects
//!
//! - [`PerCallAdapter`] — one signed payment header per call
//! - [`MandateAdapter`] — pre-issued authorization credential
//! - [`CheckoutAdapter`] — opaque settlement token acquired ahead of time
//! - [`CommerceAdapter`] — full order lifecycle with reconciled line items

pub mod adapter;
pub mod checkout;
pub mod commerce;
pub mod mandate;
pub mod percall;
pub mod request;

pub use adapter::{AdapterRegistry, ParsedSettlement, ProtocolAdapter};
pub use checkout::CheckoutAdapter;
pub use commerce::CommerceAdapter;
pub use mandate::MandateAdapter;
pub use percall::PerCallAdapter;
pub use request::{
    BatchItemOutcome, BatchRequest, RawRequest, SettlementResponse, SimulationOutcome,
    SimulationStatus,
};
