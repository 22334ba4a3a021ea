//! Sandbox wiring — a fully in-memory gateway.
//!
//! Every port gets its in-process implementation: in-memory idempotency
//! and policy stores, the in-process issuer, sandbox rails, and a
//! log-only webhook transport. This is the environment integrators hit
//! before pointing at real rails, and what the demo and integration
//! suites build on.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use opensettle_engine::{FeeBook, Ledger, SettlementEngine};
use opensettle_ingress::{
    AuthorizationVerifier, IdempotencyCache, IdempotencyStore, InMemoryIdempotencyStore,
    InMemoryPolicyStore, InProcessIssuer, IssuerClient, PolicyCache, PolicyStore, TokenAuthority,
};
use opensettle_protocol::AdapterRegistry;
use opensettle_rails::{FxTable, PayoutBridge, RailRouter, WebhookDispatcher, WebhookTransport};
use opensettle_types::{GatewayConfig, Result, SharedClock};

use crate::gateway::SettlementGateway;

/// Webhook transport that acknowledges everything and logs it — the
/// sandbox has no real consumers to reach.
pub struct LogOnlyTransport;

#[async_trait]
impl WebhookTransport for LogOnlyTransport {
    async fn deliver(&self, url: &str, payload: &Value) -> Result<()> {
        info!(%url, event = %payload["event_type"], "sandbox webhook delivery");
        Ok(())
    }
}

/// Handles to the sandbox's mutable backends, for seeding wallets,
/// policies, and issuer credentials.
pub struct SandboxHandles {
    /// The policy store behind the TTL cache (admin surface).
    pub policy_store: Arc<InMemoryPolicyStore>,
    /// The in-process issuer (credential registration).
    pub issuer: Arc<InProcessIssuer>,
}

/// Assemble a gateway with every port in-memory.
#[must_use]
pub fn sandbox_gateway(
    config: &GatewayConfig,
    clock: SharedClock,
) -> (Arc<SettlementGateway>, SandboxHandles) {
    let ledger = Arc::new(Ledger::new(Arc::clone(&clock)));
    let engine = SettlementEngine::new(Arc::clone(&ledger), FeeBook::with_defaults());

    let idempotency = IdempotencyCache::new(
        &config.idempotency,
        Arc::new(InMemoryIdempotencyStore::new()) as Arc<dyn IdempotencyStore>,
        Arc::clone(&clock),
    );

    let policy_store = Arc::new(InMemoryPolicyStore::new());
    let policies = Arc::new(PolicyCache::new(
        &config.policy,
        Arc::clone(&policy_store) as Arc<dyn PolicyStore>,
        Arc::clone(&clock),
    ));

    let authority = Arc::new(TokenAuthority::generate(&config.proof));
    let issuer = Arc::new(InProcessIssuer::new(
        Arc::clone(&authority),
        Arc::clone(&clock),
    ));
    let verifier = AuthorizationVerifier::new(
        &config.proof,
        Arc::clone(&authority),
        Arc::clone(&issuer) as Arc<dyn IssuerClient>,
        policies,
        Arc::clone(&clock),
    );

    let webhooks = Arc::new(WebhookDispatcher::new(
        &config.webhook,
        Arc::new(LogOnlyTransport) as Arc<dyn WebhookTransport>,
        Arc::clone(&clock),
    ));
    let bridge = Arc::new(PayoutBridge::new(
        &config.rail,
        RailRouter::with_sandbox_rails(),
        FxTable::with_defaults(),
        Arc::clone(&webhooks),
        Arc::clone(&clock),
    ));

    let gateway = Arc::new(SettlementGateway::new(
        AdapterRegistry::with_defaults(),
        idempotency,
        verifier,
        engine,
        authority,
        bridge,
        webhooks,
        clock,
    ));

    (
        gateway,
        SandboxHandles {
            policy_store,
            issuer,
        },
    )
}
