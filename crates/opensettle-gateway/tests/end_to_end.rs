//! End-to-end integration tests across all planes.
//!
//! These tests exercise the full pipeline:
//! Dialect Adapter → Idempotency Cache → Authorization Verifier →
//! Settlement Engine → {Payout Bridge, Webhook Dispatcher}
//!
//! They verify the gateway's observable properties in realistic
//! scenarios: concurrent duplicate suppression, exact policy enforcement
//! under load, ordered partial batch failure, local/remote proof
//! equivalence, payout bridging, and side-effect-free simulation.

#![allow(clippy::too_many_arguments)]

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use opensettle_engine::{FeeBook, FeeSchedule, Ledger, SettlementEngine};
use opensettle_gateway::SettlementGateway;
use opensettle_ingress::{
    AuthorizationVerifier, IdempotencyCache, IdempotencyStore, InMemoryIdempotencyStore,
    InMemoryPolicyStore, InProcessIssuer, IssuerClient, PolicyCache, PolicyStore, TokenAuthority,
};
use opensettle_protocol::{AdapterRegistry, BatchRequest, RawRequest};
use opensettle_rails::{
    FxTable, PayoutBridge, RailAdapter, RailRouter, WebhookDispatcher, WebhookTransport,
};
use opensettle_types::{
    AccountId, Clock, Corridor, FeeScheduleId, GatewayConfig, ManualClock, PaymentProof,
    PayoutInstruction, PayoutStatus, PolicyPeriod, RailConfig, Result, SettleError,
    SettlementCommand, SettlementStatus, SharedClock, SpendingPolicy, WalletId, WalletStatus,
    WebhookConfig,
};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Webhook transport that records every delivered payload.
struct SinkTransport {
    events: Mutex<Vec<Value>>,
}

#[async_trait]
impl WebhookTransport for SinkTransport {
    async fn deliver(&self, _url: &str, payload: &Value) -> Result<()> {
        self.events.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Rail that always reports the corridor unreachable.
struct DeadRail(Corridor);

#[async_trait]
impl RailAdapter for DeadRail {
    fn corridor(&self) -> Corridor {
        self.0
    }

    async fn submit(&self, _: &PayoutInstruction) -> Result<String> {
        Err(SettleError::RailUnreachable {
            reason: "connection refused".to_string(),
        })
    }
}

/// Full gateway wiring with inspectable backends.
struct Harness {
    gateway: Arc<SettlementGateway>,
    policy_store: Arc<InMemoryPolicyStore>,
    issuer: Arc<InProcessIssuer>,
    transport: Arc<SinkTransport>,
    clock: Arc<ManualClock>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

fn build_harness(router: RailRouter) -> Harness {
    init_tracing();
    let clock = Arc::new(ManualClock::new());
    let shared: SharedClock = Arc::clone(&clock) as SharedClock;
    let config = GatewayConfig::default();

    let ledger = Arc::new(Ledger::new(Arc::clone(&shared)));
    let mut fees = FeeBook::with_defaults();
    // Flat $1 schedule used by the worked scenarios.
    fees.register(FeeSchedule::new(
        FeeScheduleId::new("flat-usd"),
        0,
        Decimal::ONE,
    ));
    let engine = SettlementEngine::new(Arc::clone(&ledger), fees);

    let idempotency = IdempotencyCache::new(
        &config.idempotency,
        Arc::new(InMemoryIdempotencyStore::new()) as Arc<dyn IdempotencyStore>,
        Arc::clone(&shared),
    );

    let policy_store = Arc::new(InMemoryPolicyStore::new());
    let policies = Arc::new(PolicyCache::new(
        &config.policy,
        Arc::clone(&policy_store) as Arc<dyn PolicyStore>,
        Arc::clone(&shared),
    ));

    let authority = Arc::new(TokenAuthority::generate(&config.proof));
    let issuer = Arc::new(InProcessIssuer::new(
        Arc::clone(&authority),
        Arc::clone(&shared),
    ));
    issuer.register_credential("cred-ok");
    let verifier = AuthorizationVerifier::new(
        &config.proof,
        Arc::clone(&authority),
        Arc::clone(&issuer) as Arc<dyn IssuerClient>,
        policies,
        Arc::clone(&shared),
    );

    let transport = Arc::new(SinkTransport {
        events: Mutex::new(Vec::new()),
    });
    let webhooks = Arc::new(WebhookDispatcher::new(
        &WebhookConfig {
            max_attempts: 2,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
            deliver_timeout_ms: 1_000,
        },
        Arc::clone(&transport) as Arc<dyn WebhookTransport>,
        Arc::clone(&shared),
    ));
    webhooks.subscribe("https://consumer.example/hooks");

    let bridge = Arc::new(PayoutBridge::new(
        &RailConfig {
            max_attempts: 2,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
            submit_timeout_ms: 1_000,
        },
        router,
        FxTable::with_defaults(),
        Arc::clone(&webhooks),
        Arc::clone(&shared),
    ));

    let gateway = Arc::new(SettlementGateway::new(
        AdapterRegistry::with_defaults(),
        idempotency,
        verifier,
        engine,
        authority,
        bridge,
        webhooks,
        shared,
    ));

    Harness {
        gateway,
        policy_store,
        issuer,
        transport,
        clock,
    }
}

fn harness() -> Harness {
    build_harness(RailRouter::with_sandbox_rails())
}

impl Harness {
    fn ledger(&self) -> &Arc<Ledger> {
        self.gateway.engine().ledger()
    }

    fn wallet_pair(&self, payer_funds: Decimal) -> (WalletId, WalletId) {
        let payer = self
            .ledger()
            .create_wallet(AccountId::new(), "USD")
            .unwrap();
        let payee = self
            .ledger()
            .create_wallet(AccountId::new(), "USD")
            .unwrap();
        self.ledger().deposit(payer, payer_funds).unwrap();
        (payer, payee)
    }

    fn balance(&self, wallet: WalletId) -> Decimal {
        self.ledger().balance(wallet).unwrap()
    }

    fn events(&self) -> Vec<Value> {
        self.transport.events.lock().unwrap().clone()
    }
}

/// A checkout-dialect request with the flat $1 fee schedule.
fn checkout_request(payer: WalletId, payee: WalletId, key: &str, amount: &str) -> RawRequest {
    RawRequest::new(json!({
        "protocol": "checkout",
        "idempotency_key": key,
        "payer_ref": payer,
        "payee_ref": payee,
        "amount": amount,
        "currency": "USD",
        "fee_schedule": "flat-usd",
        "proof": {"token": "cred-ok"},
    }))
}

/// Retry through `duplicate-in-flight` until the key resolves.
async fn settle_until_resolved(
    gateway: &Arc<SettlementGateway>,
    raw: &RawRequest,
) -> opensettle_protocol::SettlementResponse {
    loop {
        match gateway.settle(raw).await {
            Ok(response) => return response,
            Err(SettleError::DuplicateInFlight) => {
                tokio::time::sleep(StdDuration::from_millis(2)).await;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F, what: &str) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(2)).await;
    }
    panic!("timed out waiting for {what}");
}

// ---------------------------------------------------------------------------
// Worked scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn settles_and_replays_the_worked_scenario() {
    let h = harness();
    // W1 holds $50; settle $30 with a $1 fee.
    let (w1, w2) = h.wallet_pair(Decimal::new(5000, 2));

    let raw = checkout_request(w1, w2, "k1", "30.00");
    let first = h.gateway.settle(&raw).await.unwrap();

    assert_eq!(first.status, SettlementStatus::Completed);
    assert_eq!(first.gross_amount, Decimal::new(3000, 2));
    assert_eq!(first.fee_amount, Decimal::new(100, 2));
    assert_eq!(first.net_amount, Decimal::new(2900, 2));
    assert_eq!(h.balance(w1), Decimal::new(2000, 2)); // $20
    assert_eq!(h.balance(w2), Decimal::new(2900, 2)); // +$29
    let platform = h.ledger().platform_wallet("USD");
    assert_eq!(h.balance(platform), Decimal::new(100, 2)); // +$1
    assert!(first.proof_token.is_some());

    // Resubmitting the identical request: same settlement id, same token,
    // no balance change.
    let replay = h.gateway.settle(&raw).await.unwrap();
    assert_eq!(replay.settlement_id, first.settlement_id);
    assert_eq!(replay.proof_token, first.proof_token);
    assert_eq!(h.balance(w1), Decimal::new(2000, 2));
    assert_eq!(h.balance(w2), Decimal::new(2900, 2));

    h.ledger().verify_conservation("USD").unwrap();
}

#[tokio::test]
async fn policy_allowance_scenario_rejects_with_hint() {
    let h = harness();
    let (w1, w2) = h.wallet_pair(Decimal::new(50_000, 2));

    // Policy: $100 daily cap, $80 already consumed today → $20 remaining.
    let mut policy = SpendingPolicy::new(
        w1,
        PolicyPeriod::Daily,
        Decimal::new(100, 0),
        h.clock.now(),
    );
    policy.consumed = Decimal::new(80, 0);
    h.policy_store.upsert(policy);

    let raw = checkout_request(w1, w2, "k-policy", "30.00");
    let response = h.gateway.settle(&raw).await.unwrap();

    assert_eq!(response.status, SettlementStatus::Failed);
    let failure = response.failure.unwrap();
    assert!(failure.contains("OS_ERR_400"), "got: {failure}");
    assert!(
        failure.contains("remaining policy allowance: 20"),
        "got: {failure}"
    );
    // Balances untouched.
    assert_eq!(h.balance(w1), Decimal::new(50_000, 2));
    assert_eq!(h.balance(w2), Decimal::ZERO);
}

// ---------------------------------------------------------------------------
// Idempotency under concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_settle_exactly_once() {
    let h = harness();
    let (w1, w2) = h.wallet_pair(Decimal::new(5000, 2));
    let raw = checkout_request(w1, w2, "contested", "30.00");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gateway = Arc::clone(&h.gateway);
        let raw = raw.clone();
        handles.push(tokio::spawn(async move {
            settle_until_resolved(&gateway, &raw).await
        }));
    }

    let mut responses = Vec::new();
    for handle in handles {
        responses.push(handle.await.unwrap());
    }

    // N identical responses...
    let first = &responses[0];
    for response in &responses {
        assert_eq!(response.settlement_id, first.settlement_id);
        assert_eq!(response.status, SettlementStatus::Completed);
        assert_eq!(response.proof_token, first.proof_token);
    }
    // ...and exactly one balance movement.
    assert_eq!(h.balance(w1), Decimal::new(2000, 2));
    assert_eq!(h.balance(w2), Decimal::new(2900, 2));
    h.ledger().verify_conservation("USD").unwrap();
}

#[tokio::test]
async fn failed_settlement_replays_the_failure() {
    let h = harness();
    // Only $5 of funds; the $30 settlement fails on balance.
    let (w1, w2) = h.wallet_pair(Decimal::new(500, 2));

    let raw = checkout_request(w1, w2, "k-fail", "30.00");
    let first = h.gateway.settle(&raw).await.unwrap();
    assert_eq!(first.status, SettlementStatus::Failed);
    assert!(first.failure.as_deref().unwrap().contains("OS_ERR_200"));

    let replay = h.gateway.settle(&raw).await.unwrap();
    assert_eq!(replay.settlement_id, first.settlement_id);
    assert_eq!(replay.status, SettlementStatus::Failed);
    assert_eq!(h.balance(w1), Decimal::new(500, 2));
}

// ---------------------------------------------------------------------------
// Policy enforcement under concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_dollar_cap_admits_exactly_five_twenties() {
    let h = harness();
    let (w1, w2) = h.wallet_pair(Decimal::new(100_000, 2));
    h.policy_store.upsert(SpendingPolicy::new(
        w1,
        PolicyPeriod::Daily,
        Decimal::new(100, 0),
        h.clock.now(),
    ));

    let mut handles = Vec::new();
    for i in 0..10 {
        let gateway = Arc::clone(&h.gateway);
        let raw = checkout_request(w1, w2, &format!("cap-{i}"), "20.00");
        handles.push(tokio::spawn(async move {
            gateway.settle(&raw).await.unwrap()
        }));
    }

    let mut completed = 0;
    let mut policy_exceeded = 0;
    for handle in handles {
        let response = handle.await.unwrap();
        match response.status {
            SettlementStatus::Completed => completed += 1,
            SettlementStatus::Failed => {
                assert!(
                    response.failure.as_deref().unwrap().contains("OS_ERR_400"),
                    "only policy rejections expected"
                );
                policy_exceeded += 1;
            }
            SettlementStatus::Pending => panic!("no settlement should stay pending"),
        }
    }

    assert_eq!(completed, 5, "exactly five $20 settlements fit a $100 cap");
    assert_eq!(policy_exceeded, 5);
    // Five settlements of $20 left the payer.
    assert_eq!(h.balance(w1), Decimal::new(90_000, 2));
    h.ledger().verify_conservation("USD").unwrap();
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_partial_failure_keeps_order() {
    let h = harness();
    let (payer, payee) = h.wallet_pair(Decimal::new(100_000, 2));
    let frozen = h
        .ledger()
        .create_wallet(AccountId::new(), "USD")
        .unwrap();
    h.ledger()
        .set_wallet_status(frozen, WalletStatus::Frozen)
        .unwrap();

    let requests = (0..10)
        .map(|i| {
            let target = if i == 3 { frozen } else { payee };
            checkout_request(payer, target, &format!("wk-{i}"), "10.00")
        })
        .collect();
    let batch = BatchRequest {
        batch_id: "weekly-payout-2026-08".to_string(),
        requests,
    };

    let outcomes = h.gateway.settle_batch(&batch).await;
    assert_eq!(outcomes.len(), 10);

    for (i, outcome) in outcomes.iter().enumerate() {
        match outcome {
            opensettle_protocol::BatchItemOutcome::Settled(response) => {
                if i == 3 {
                    assert_eq!(response.status, SettlementStatus::Failed);
                    assert!(
                        response.failure.as_deref().unwrap().contains("OS_ERR_201"),
                        "item 3 must fail wallet-unavailable"
                    );
                } else {
                    assert_eq!(response.status, SettlementStatus::Completed, "item {i}");
                }
            }
            opensettle_protocol::BatchItemOutcome::Rejected { reason } => {
                panic!("no admission rejections expected, got {reason}");
            }
        }
    }

    // Nine $10 settlements moved.
    assert_eq!(h.balance(payer), Decimal::new(91_000, 2));
    h.ledger().verify_conservation("USD").unwrap();
}

#[tokio::test]
async fn batch_simulation_previews_without_committing() {
    let h = harness();
    let (payer, payee) = h.wallet_pair(Decimal::new(1500, 2)); // $15

    let batch = BatchRequest {
        batch_id: "preview".to_string(),
        requests: vec![
            checkout_request(payer, payee, "sim-0", "10.00"),
            checkout_request(payer, payee, "sim-1", "100.00"), // exceeds funds
        ],
    };

    let outcomes = h.gateway.simulate_batch(&batch).await;
    assert_eq!(
        outcomes[0].status,
        opensettle_protocol::SimulationStatus::WouldComplete
    );
    assert_eq!(
        outcomes[1].status,
        opensettle_protocol::SimulationStatus::WouldFail
    );
    assert!(
        outcomes[1].reason.as_deref().unwrap().contains("OS_ERR_200"),
        "specific reason expected"
    );

    // Nothing moved, nothing recorded, keys still fresh.
    assert_eq!(h.balance(payer), Decimal::new(1500, 2));
    let settle = h
        .gateway
        .settle(&checkout_request(payer, payee, "sim-0", "10.00"))
        .await
        .unwrap();
    assert_eq!(settle.status, SettlementStatus::Completed);
}

// ---------------------------------------------------------------------------
// Local vs. remote proof verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn local_and_remote_receipt_decisions_agree_on_a_corpus() {
    let h = harness();
    let authority = h.gateway.authority();
    let now = h.clock.now();

    let wallet = WalletId::new();
    let other_wallet = WalletId::new();
    let base_record = {
        let mut cmd = SettlementCommand::dummy("corpus", Decimal::new(10_000, 2));
        cmd.payer = wallet;
        opensettle_types::SettlementRecord::completed(&cmd, Decimal::ZERO, now)
    };

    // Corpus: expiry offsets around the boundary, tampering, limit and
    // binding violations — crossed with spend amounts.
    let mut corpus = Vec::new();
    for offset_secs in [-86_401i64, -1, 0, 1, 3_600] {
        for tamper in [false, true] {
            let mut token = authority.issue(&base_record, now);
            // Shift expiry by re-issuing at a shifted "now" is not possible
            // post-signature, so shift the evaluation instant instead.
            let eval_at = token.expires_at + chrono::Duration::seconds(offset_secs);
            if tamper {
                token.amount_limit += Decimal::ONE;
            }
            corpus.push((token, eval_at));
        }
    }

    for (i, (token, eval_at)) in corpus.into_iter().enumerate() {
        for (payer, amount, currency) in [
            (wallet, Decimal::new(5_000, 2), "USD"),
            (wallet, Decimal::new(10_000, 2), "USD"),
            (wallet, Decimal::new(10_001, 2), "USD"), // over limit
            (other_wallet, Decimal::new(5_000, 2), "USD"), // wrong wallet
            (wallet, Decimal::new(5_000, 2), "BRL"),  // wrong currency
        ] {
            let mut cmd = SettlementCommand::dummy(&format!("corpus-{i}"), amount);
            cmd.payer = payer;
            cmd.currency = currency.to_string();

            // Local path.
            let local = authority.authorize_spend(&token, payer, amount, currency, eval_at);
            // Remote path: what the issuing authority would decide for the
            // same token at the same instant.
            h.clock.set(eval_at);
            let remote = h
                .issuer
                .verify(&PaymentProof::Receipt(token.clone()), &cmd)
                .await;
            h.clock.set(now);

            match (&local, &remote) {
                (Ok(()), Ok(())) => {}
                (Err(a), Err(b)) => {
                    assert_eq!(a.to_string(), b.to_string(), "divergent rejection reasons");
                }
                (a, b) => panic!("local {a:?} disagrees with remote {b:?}"),
            }
        }
    }
}

#[tokio::test]
async fn proof_token_reuse_settles_without_issuer_round_trip() {
    let h = harness();
    let (w1, w2) = h.wallet_pair(Decimal::new(10_000, 2));

    // First settlement earns a receipt.
    let first = h
        .gateway
        .settle(&checkout_request(w1, w2, "earn", "40.00"))
        .await
        .unwrap();
    let receipt = first.proof_token.unwrap();

    // Second settlement authenticates with the receipt alone — the
    // credential was never registered with the issuer.
    let raw = RawRequest::new(json!({
        "protocol": "checkout",
        "idempotency_key": "reuse",
        "payer_ref": w1,
        "payee_ref": w2,
        "amount": "15.00",
        "currency": "USD",
        "fee_schedule": "flat-usd",
        "proof": {"token": receipt},
    }));
    let second = h.gateway.settle(&raw).await.unwrap();
    assert_eq!(second.status, SettlementStatus::Completed);
}

// ---------------------------------------------------------------------------
// Payout bridging & webhooks
// ---------------------------------------------------------------------------

fn pix_payout_body(payer: WalletId, payee: WalletId, key: &str) -> RawRequest {
    RawRequest::new(json!({
        "protocol": "checkout",
        "idempotency_key": key,
        "payer_ref": payer,
        "payee_ref": payee,
        "amount": "100.00",
        "currency": "USD",
        "fee_schedule": "flat-usd",
        "proof": {"token": "cred-ok"},
        "payout": {
            "destination": {
                "type": "pix",
                "pix_key": "maria@email.com",
                "pix_key_type": "email",
                "name": "Maria Silva",
            },
        },
    }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completed_settlement_bridges_to_pix() {
    let h = harness();
    let worker = h.gateway.spawn_workers();
    let (w1, w2) = h.wallet_pair(Decimal::new(20_000, 2));

    // The caller can price the corridor before committing.
    let quote = h
        .gateway
        .quote("USD", Corridor::Pix, Decimal::new(100, 0))
        .unwrap();
    assert_eq!(quote.rate, Decimal::new(54, 1));
    assert_eq!(quote.to_amount, Decimal::new(540, 0));

    let response = h
        .gateway
        .settle(&pix_payout_body(w1, w2, "pix-1"))
        .await
        .unwrap();
    assert_eq!(response.status, SettlementStatus::Completed);

    // The settlement answered immediately; the payout completes behind it.
    let settlement_id = response.settlement_id;
    wait_for(
        || {
            h.gateway
                .payout_status(settlement_id)
                .is_some_and(|p| p.status == PayoutStatus::Completed)
        },
        "payout completion",
    )
    .await;

    let payout = h.gateway.payout_status(settlement_id).unwrap();
    assert_eq!(payout.local_currency, "BRL");
    // net $99.00 * 5.4 = R$534.60
    assert_eq!(payout.local_amount, Decimal::new(53_460, 2));
    assert!(payout.external_ref.as_deref().unwrap().starts_with("pix-"));

    // Webhooks: settlement.completed and payout.completed both land.
    wait_for(|| h.events().len() >= 2, "webhook deliveries").await;
    let types: Vec<String> = h
        .events()
        .iter()
        .map(|event| event["event_type"].as_str().unwrap().to_string())
        .collect();
    assert!(types.contains(&"settlement.completed".to_string()));
    assert!(types.contains(&"payout.completed".to_string()));

    worker.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_payout_never_reverses_the_settlement() {
    let mut router = RailRouter::new();
    router.register(Arc::new(DeadRail(Corridor::Pix)));
    let h = build_harness(router);
    let worker = h.gateway.spawn_workers();
    let (w1, w2) = h.wallet_pair(Decimal::new(20_000, 2));

    let response = h
        .gateway
        .settle(&pix_payout_body(w1, w2, "pix-dead"))
        .await
        .unwrap();
    assert_eq!(response.status, SettlementStatus::Completed);

    let settlement_id = response.settlement_id;
    wait_for(
        || {
            h.gateway
                .payout_status(settlement_id)
                .is_some_and(|p| p.status == PayoutStatus::Failed)
        },
        "payout failure",
    )
    .await;

    // The ledger movement stands; the pair is auditable.
    let record = h.gateway.lookup_settlement(settlement_id).unwrap();
    assert_eq!(record.status, SettlementStatus::Completed);
    assert_eq!(h.balance(w2), Decimal::new(9_900, 2));
    let failed = h.gateway.bridge().failed_payouts();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].settlement_id, settlement_id);

    wait_for(
        || {
            h.events()
                .iter()
                .any(|event| event["event_type"] == "payout.failed")
        },
        "payout.failed webhook",
    )
    .await;

    worker.abort();
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simulation_is_side_effect_free() {
    let h = harness();
    let (w1, w2) = h.wallet_pair(Decimal::new(5_000, 2));

    let raw = checkout_request(w1, w2, "sim-key", "30.00");
    let outcome = h.gateway.simulate(&raw).await.unwrap();

    assert_eq!(
        outcome.status,
        opensettle_protocol::SimulationStatus::WouldComplete
    );
    assert_eq!(outcome.fee_amount, Decimal::new(100, 2));
    assert_eq!(outcome.net_amount, Decimal::new(2_900, 2));

    // No claim, no record, no movement: the same key settles for real.
    assert_eq!(h.balance(w1), Decimal::new(5_000, 2));
    let settle = h.gateway.settle(&raw).await.unwrap();
    assert_eq!(settle.status, SettlementStatus::Completed);
}

#[tokio::test]
async fn simulation_reports_the_specific_rejection() {
    let h = harness();
    let (w1, w2) = h.wallet_pair(Decimal::new(1_000, 2)); // $10

    let raw = checkout_request(w1, w2, "sim-poor", "30.00");
    let outcome = h.gateway.simulate(&raw).await.unwrap();

    assert_eq!(
        outcome.status,
        opensettle_protocol::SimulationStatus::WouldFail
    );
    assert!(outcome.reason.as_deref().unwrap().contains("OS_ERR_200"));
}

// ---------------------------------------------------------------------------
// Dialect coverage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_dialect_reaches_the_same_engine() {
    use base64::Engine as _;

    let h = harness();
    h.issuer.register_credential("mandate-cred");
    h.issuer.register_credential("spt-cred");
    let percall_payload =
        base64::engine::general_purpose::STANDARD.encode(br#"{"scheme":"exact"}"#);
    h.issuer.register_credential(percall_payload.clone());
    let (w1, w2) = h.wallet_pair(Decimal::new(100_000, 2));

    // percall: header-borne proof.
    let percall = RawRequest::new(json!({
        "idempotency_key": "d-percall",
        "payer_ref": w1,
        "payee_ref": w2,
        "amount": "0.05",
        "currency": "USD",
        "fee_schedule": "free",
    }))
    .with_header("X-Settlement-Protocol", "percall")
    .with_header("X-Payment", percall_payload);

    // mandate: credential drawn on a mandate.
    let mandate = RawRequest::new(json!({
        "protocol": "mandate",
        "idempotency_key": "d-mandate",
        "payer_ref": w1,
        "payee_ref": w2,
        "amount": "125.00",
        "currency": "USD",
        "fee_schedule": "free",
        "proof": {
            "mandate_id": opensettle_types::MandateId::new(),
            "credential": "mandate-cred",
        },
    }));

    // checkout: opaque token.
    let checkout = checkout_request(w1, w2, "d-checkout", "10.00");

    // commerce: reconciled order.
    let commerce = RawRequest::new(json!({
        "protocol": "commerce",
        "idempotency_key": "d-commerce",
        "payer_ref": w1,
        "payee_ref": w2,
        "amount": "45.00",
        "currency": "USD",
        "fee_schedule": "free",
        "proof": {"shared_token": "spt-cred"},
        "order": {
            "order_id": "ord_889",
            "line_items": [
                {"name": "widget", "amount": "30.00"},
                {"name": "shipping", "amount": "15.00"},
            ],
            "total": "45.00",
        },
    }));

    for raw in [&percall, &mandate, &checkout, &commerce] {
        let response = h.gateway.settle(raw).await.unwrap();
        assert_eq!(response.status, SettlementStatus::Completed);
    }

    // Formatted responses speak each dialect's vocabulary.
    let formatted = h.gateway.settle_formatted(&percall).await.unwrap();
    assert_eq!(formatted["status"], "settled");
    let formatted = h.gateway.settle_formatted(&commerce).await.unwrap();
    assert_eq!(formatted["order_settlement"]["state"], "captured");

    h.ledger().verify_conservation("USD").unwrap();
}
