//! The adapter capability set and the tag-keyed dispatch registry.
//!
//! Dispatch inspects the protocol-identifying field once and selects one
//! adapter — there is no adapter probing, and no adapter ever sees
//! another dialect's request.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use opensettle_types::{
    PaymentProof, ProofToken, Protocol, Result, SettleError, SettlementCommand, SettlementRecord,
    TOKEN_PREFIX,
};

use crate::request::RawRequest;
use crate::{CheckoutAdapter, CommerceAdapter, MandateAdapter, PerCallAdapter};

/// The output of a successful parse: the canonical command plus the proof
/// bytes the authorization verifier needs.
#[derive(Debug, Clone)]
pub struct ParsedSettlement {
    /// Canonical, protocol-agnostic command.
    pub command: SettlementCommand,
    /// The dialect's payment proof.
    pub proof: PaymentProof,
}

/// The single capability set every dialect implements.
///
/// Adapters own proof **extraction** (the bytes differ per protocol) but
/// delegate all proof **verification** to the shared verifier.
pub trait ProtocolAdapter: Send + Sync {
    /// The tag this adapter serves.
    fn protocol(&self) -> Protocol;

    /// Parse a raw request into the canonical command and its proof.
    fn parse(&self, raw: &RawRequest) -> Result<ParsedSettlement>;

    /// Serialize a settlement record back into this dialect's response
    /// vocabulary.
    fn format(&self, record: &SettlementRecord) -> Value;
}

/// Tag-keyed adapter registry.
pub struct AdapterRegistry {
    adapters: HashMap<Protocol, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// A registry with all four built-in dialects.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PerCallAdapter));
        registry.register(Arc::new(MandateAdapter));
        registry.register(Arc::new(CheckoutAdapter));
        registry.register(Arc::new(CommerceAdapter));
        registry
    }

    /// Register an adapter under its own tag. Replaces any previous
    /// adapter for the same tag.
    pub fn register(&mut self, adapter: Arc<dyn ProtocolAdapter>) {
        self.adapters.insert(adapter.protocol(), adapter);
    }

    /// Select the adapter for a raw request by its protocol tag.
    ///
    /// # Errors
    /// Returns [`SettleError::UnknownProtocol`] when the tag is absent or
    /// no adapter serves it.
    pub fn dispatch(&self, raw: &RawRequest) -> Result<Arc<dyn ProtocolAdapter>> {
        let tag = raw.protocol_tag().ok_or_else(|| SettleError::UnknownProtocol {
            tag: "<missing>".to_string(),
        })?;
        let protocol = Protocol::from_tag(tag).ok_or_else(|| SettleError::UnknownProtocol {
            tag: tag.to_string(),
        })?;
        let adapter =
            self.adapters
                .get(&protocol)
                .cloned()
                .ok_or_else(|| SettleError::UnknownProtocol {
                    tag: tag.to_string(),
                })?;
        debug!(protocol = %protocol, "dispatched request to adapter");
        Ok(adapter)
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Interpret a dialect credential string, honoring receipts.
///
/// Any dialect accepts a prior settlement's proof token (`ost1.` prefix)
/// in place of its native credential; the verifier then takes the local
/// path. Otherwise the credential is wrapped with `native`.
pub(crate) fn receipt_or(
    credential: &str,
    native: impl FnOnce(String) -> PaymentProof,
) -> Result<PaymentProof> {
    if credential.starts_with(TOKEN_PREFIX) {
        Ok(PaymentProof::Receipt(ProofToken::decode(credential)?))
    } else {
        Ok(native(credential.to_string()))
    }
}
