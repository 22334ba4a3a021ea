//! The settlement gateway — one execution path for four wire dialects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{info, warn};

use opensettle_engine::SettlementEngine;
use opensettle_ingress::{AuthorizationVerifier, ClaimOutcome, IdempotencyCache, TokenAuthority};
use opensettle_protocol::{
    AdapterRegistry, BatchItemOutcome, BatchRequest, ParsedSettlement, ProtocolAdapter, RawRequest,
    SettlementResponse, SimulationOutcome, SimulationStatus,
};
use opensettle_rails::{PayoutBridge, WebhookDispatcher};
use opensettle_types::{
    Clock, EventType, LedgerEvent, PayoutInstruction, Result, SettleError, SettlementId,
    SettlementRecord, SharedClock, Wallet, WalletId, WebhookEvent,
};
use rust_decimal::Decimal;

/// The assembled gateway. One instance serves every dialect.
pub struct SettlementGateway {
    adapters: AdapterRegistry,
    idempotency: IdempotencyCache,
    verifier: AuthorizationVerifier,
    engine: SettlementEngine,
    authority: Arc<TokenAuthority>,
    bridge: Arc<PayoutBridge>,
    webhooks: Arc<WebhookDispatcher>,
    /// Wire tokens by settlement id, so a replayed duplicate returns a
    /// byte-identical response including the receipt.
    issued_tokens: Mutex<HashMap<SettlementId, String>>,
    clock: SharedClock,
}

/// What the core pipeline produced for one request.
struct PipelineResult {
    adapter: Arc<dyn ProtocolAdapter>,
    record: SettlementRecord,
    proof_token: Option<String>,
}

impl SettlementGateway {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        adapters: AdapterRegistry,
        idempotency: IdempotencyCache,
        verifier: AuthorizationVerifier,
        engine: SettlementEngine,
        authority: Arc<TokenAuthority>,
        bridge: Arc<PayoutBridge>,
        webhooks: Arc<WebhookDispatcher>,
        clock: SharedClock,
    ) -> Self {
        Self {
            adapters,
            idempotency,
            verifier,
            engine,
            authority,
            bridge,
            webhooks,
            issued_tokens: Mutex::new(HashMap::new()),
            clock,
        }
    }

    // -----------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------

    /// Settle one request, returning the generic response shape.
    ///
    /// # Errors
    /// - Parse-stage errors (`UnknownProtocol`, `MalformedRequest`, ...)
    ///   — nothing was claimed
    /// - [`SettleError::DuplicateInFlight`] — retry shortly
    ///
    /// Post-claim rejections come back as an `Ok` response with status
    /// `failed` and the specific reason; the idempotency key resolves to
    /// that failure and replays it.
    pub async fn settle(&self, raw: &RawRequest) -> Result<SettlementResponse> {
        let result = self.run_pipeline(raw).await?;
        Ok(SettlementResponse::from_record(
            &result.record,
            result.proof_token,
        ))
    }

    /// Settle one request, returning the dialect's own response vocabulary.
    pub async fn settle_formatted(&self, raw: &RawRequest) -> Result<Value> {
        let result = self.run_pipeline(raw).await?;
        Ok(result.adapter.format(&result.record))
    }

    async fn run_pipeline(&self, raw: &RawRequest) -> Result<PipelineResult> {
        let adapter = self.adapters.dispatch(raw)?;
        let parsed = adapter.parse(raw)?;
        let key = parsed.command.idempotency_key.clone();

        match self.idempotency.check_and_claim(&key).await? {
            ClaimOutcome::DuplicateResolved(record) => {
                info!(key = %key, settlement = %record.id, "duplicate request; replaying");
                let proof_token = self.issued_token(record.id);
                return Ok(PipelineResult {
                    adapter,
                    record: *record,
                    proof_token,
                });
            }
            ClaimOutcome::DuplicateInFlight => return Err(SettleError::DuplicateInFlight),
            ClaimOutcome::New => {}
        }

        // The claim is held; every path below resolves it terminally.
        if let Err(reason) = self
            .verifier
            .authorize(&parsed.command, &parsed.proof)
            .await
        {
            let record = self.reject(&parsed, &reason).await?;
            return Ok(PipelineResult {
                adapter,
                record,
                proof_token: None,
            });
        }

        match self.engine.execute(&parsed.command) {
            Ok(record) => {
                let proof_token = self.issue_token(&record);
                self.idempotency.resolve(&key, record.clone()).await?;
                Ok(PipelineResult {
                    adapter,
                    record,
                    proof_token: Some(proof_token),
                })
            }
            Err(reason) => {
                self.release_policy(&parsed, &reason).await;
                let record = self.reject(&parsed, &reason).await?;
                Ok(PipelineResult {
                    adapter,
                    record,
                    proof_token: None,
                })
            }
        }
    }

    /// Resolve a held claim with a failed record carrying the reason.
    async fn reject(&self, parsed: &ParsedSettlement, reason: &SettleError) -> Result<SettlementRecord> {
        warn!(
            key = %parsed.command.idempotency_key,
            protocol = %parsed.command.protocol,
            %reason,
            "settlement rejected"
        );
        let record = self.engine.record_failure(&parsed.command, reason);
        self.idempotency
            .resolve(&parsed.command.idempotency_key, record.clone())
            .await?;
        Ok(record)
    }

    /// Return the policy reservation after an engine-stage failure.
    async fn release_policy(&self, parsed: &ParsedSettlement, reason: &SettleError) {
        if let Err(release_err) = self
            .verifier
            .release_policy(parsed.command.payer, parsed.command.gross_amount)
            .await
        {
            warn!(
                key = %parsed.command.idempotency_key,
                %reason,
                %release_err,
                "failed to release policy reservation"
            );
        }
    }

    fn issue_token(&self, record: &SettlementRecord) -> String {
        let wire = self.authority.issue(record, self.clock.now()).encode();
        self.issued_tokens
            .lock()
            .expect("token map poisoned")
            .insert(record.id, wire.clone());
        wire
    }

    fn issued_token(&self, settlement_id: SettlementId) -> Option<String> {
        self.issued_tokens
            .lock()
            .expect("token map poisoned")
            .get(&settlement_id)
            .cloned()
    }

    // -----------------------------------------------------------------
    // Simulation
    // -----------------------------------------------------------------

    /// Run the full validation pipeline with **no** side effects: no
    /// idempotency claim, no policy reservation, no balance movement.
    pub async fn simulate(&self, raw: &RawRequest) -> Result<SimulationOutcome> {
        let adapter = self.adapters.dispatch(raw)?;
        let parsed = adapter.parse(raw)?;
        let command = &parsed.command;

        let fee = match self.engine.quote_fee(command) {
            Ok(fee) => fee,
            Err(reason) => return Ok(Self::would_fail(command.gross_amount, &reason)),
        };

        let checks = async {
            self.verifier.verify_proof(command, &parsed.proof).await?;
            self.verifier
                .check_policy(command.payer, command.gross_amount)
                .await?;
            self.engine.simulate(command)?;
            if let Some(payout) = &command.payout {
                self.bridge
                    .preflight(&command.currency, &payout.destination)?;
            }
            Ok::<(), SettleError>(())
        };

        match checks.await {
            Ok(()) => Ok(SimulationOutcome {
                status: SimulationStatus::WouldComplete,
                reason: None,
                gross_amount: command.gross_amount,
                fee_amount: fee,
                net_amount: command.gross_amount - fee,
            }),
            Err(reason) => Ok(Self::would_fail(command.gross_amount, &reason)),
        }
    }

    fn would_fail(gross: Decimal, reason: &SettleError) -> SimulationOutcome {
        SimulationOutcome {
            status: SimulationStatus::WouldFail,
            reason: Some(reason.to_string()),
            gross_amount: gross,
            fee_amount: Decimal::ZERO,
            net_amount: Decimal::ZERO,
        }
    }

    // -----------------------------------------------------------------
    // Batch
    // -----------------------------------------------------------------

    /// Execute a batch: per-item outcomes in input order, partial-failure
    /// semantics, and one ledger round trip for everything that cleared
    /// admission.
    pub async fn settle_batch(&self, batch: &BatchRequest) -> Vec<BatchItemOutcome> {
        info!(batch = %batch.batch_id, items = batch.requests.len(), "batch settlement started");

        // Phase 1: admission per item — parse, claim, authorize.
        let mut slots = Vec::with_capacity(batch.requests.len());
        for raw in &batch.requests {
            slots.push(self.admit(raw).await);
        }

        // Phase 2: everything admitted shares one ledger round trip.
        let ready: Vec<&ParsedSettlement> = slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Ready(parsed) => Some(parsed),
                Slot::Done(_) => None,
            })
            .collect();
        let commands: Vec<_> = ready.iter().map(|parsed| parsed.command.clone()).collect();
        let mut executed = self.engine.execute_batch(&commands).into_iter();

        // Phase 3: resolve claims and map outcomes back in input order.
        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Slot::Done(outcome) => outcomes.push(outcome),
                Slot::Ready(parsed) => {
                    let result = executed
                        .next()
                        .unwrap_or_else(|| Err(SettleError::Internal("batch underrun".into())));
                    outcomes.push(self.finish_batch_item(&parsed, result).await);
                }
            }
        }
        outcomes
    }

    async fn admit(&self, raw: &RawRequest) -> Slot {
        let adapter = match self.adapters.dispatch(raw) {
            Ok(adapter) => adapter,
            Err(err) => return Slot::Done(BatchItemOutcome::Rejected { reason: err.to_string() }),
        };
        let parsed = match adapter.parse(raw) {
            Ok(parsed) => parsed,
            Err(err) => return Slot::Done(BatchItemOutcome::Rejected { reason: err.to_string() }),
        };

        match self
            .idempotency
            .check_and_claim(&parsed.command.idempotency_key)
            .await
        {
            Ok(ClaimOutcome::New) => {}
            Ok(ClaimOutcome::DuplicateResolved(record)) => {
                let proof_token = self.issued_token(record.id);
                return Slot::Done(BatchItemOutcome::Settled(SettlementResponse::from_record(
                    &record,
                    proof_token,
                )));
            }
            Ok(ClaimOutcome::DuplicateInFlight) => {
                return Slot::Done(BatchItemOutcome::Rejected {
                    reason: SettleError::DuplicateInFlight.to_string(),
                });
            }
            Err(err) => {
                return Slot::Done(BatchItemOutcome::Rejected { reason: err.to_string() });
            }
        }

        if let Err(reason) = self
            .verifier
            .authorize(&parsed.command, &parsed.proof)
            .await
        {
            return match self.reject(&parsed, &reason).await {
                Ok(record) => Slot::Done(BatchItemOutcome::Settled(
                    SettlementResponse::from_record(&record, None),
                )),
                Err(err) => Slot::Done(BatchItemOutcome::Rejected { reason: err.to_string() }),
            };
        }

        Slot::Ready(parsed)
    }

    async fn finish_batch_item(
        &self,
        parsed: &ParsedSettlement,
        result: Result<SettlementRecord>,
    ) -> BatchItemOutcome {
        match result {
            Ok(record) => {
                let proof_token = self.issue_token(&record);
                match self
                    .idempotency
                    .resolve(&parsed.command.idempotency_key, record.clone())
                    .await
                {
                    Ok(()) => BatchItemOutcome::Settled(SettlementResponse::from_record(
                        &record,
                        Some(proof_token),
                    )),
                    Err(err) => BatchItemOutcome::Rejected { reason: err.to_string() },
                }
            }
            Err(reason) => {
                self.release_policy(parsed, &reason).await;
                match self.reject(parsed, &reason).await {
                    Ok(record) => BatchItemOutcome::Settled(SettlementResponse::from_record(
                        &record, None,
                    )),
                    Err(err) => BatchItemOutcome::Rejected { reason: err.to_string() },
                }
            }
        }
    }

    /// Preview a batch without committing anything — the same validation
    /// the real run performs, item by item, in input order.
    pub async fn simulate_batch(&self, batch: &BatchRequest) -> Vec<SimulationOutcome> {
        let mut outcomes = Vec::with_capacity(batch.requests.len());
        for raw in &batch.requests {
            let outcome = match self.simulate(raw).await {
                Ok(outcome) => outcome,
                Err(reason) => Self::would_fail(Decimal::ZERO, &reason),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    // -----------------------------------------------------------------
    // Read-only collaborator surface
    // -----------------------------------------------------------------

    /// Settlement record by id. Dashboards and reporting read this; they
    /// never write ledger state.
    #[must_use]
    pub fn lookup_settlement(&self, id: SettlementId) -> Option<SettlementRecord> {
        self.engine.ledger().record_by_id(id)
    }

    /// Wallet snapshot by id.
    #[must_use]
    pub fn lookup_wallet(&self, id: WalletId) -> Option<Wallet> {
        self.engine.ledger().wallet(id)
    }

    /// Payout status by settlement id — the polling surface for the
    /// asynchronous rail leg.
    #[must_use]
    pub fn payout_status(&self, settlement_id: SettlementId) -> Option<PayoutInstruction> {
        self.bridge.status_for_settlement(settlement_id)
    }

    /// Price a corridor conversion ahead of a settlement-with-payout.
    pub fn quote(
        &self,
        currency: &str,
        corridor: opensettle_types::Corridor,
        amount: Decimal,
    ) -> Result<opensettle_rails::FxQuote> {
        self.bridge.quote(currency, corridor, amount)
    }

    /// The webhook dispatcher (subscription management).
    #[must_use]
    pub fn webhooks(&self) -> &Arc<WebhookDispatcher> {
        &self.webhooks
    }

    /// The payout bridge (audit views).
    #[must_use]
    pub fn bridge(&self) -> &Arc<PayoutBridge> {
        &self.bridge
    }

    /// The engine (and through it, the ledger).
    #[must_use]
    pub fn engine(&self) -> &SettlementEngine {
        &self.engine
    }

    /// The token authority (receipt verification key).
    #[must_use]
    pub fn authority(&self) -> &Arc<TokenAuthority> {
        &self.authority
    }

    // -----------------------------------------------------------------
    // Async side-effect workers
    // -----------------------------------------------------------------

    /// Spawn the outbox relay: completed-settlement events fan out to the
    /// webhook dispatcher and, when a payout was requested, to the rail
    /// bridge. Runs until the gateway is dropped and the task aborted.
    pub fn spawn_workers(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let events = gateway.engine.ledger().wait_events().await;
                for event in events {
                    let LedgerEvent::SettlementCompleted { record, payout } = event;

                    let webhook_event = WebhookEvent::new(
                        EventType::SettlementCompleted,
                        record.id,
                        serde_json::json!({
                            "gross": record.gross,
                            "fee": record.fee,
                            "net": record.net,
                            "currency": record.currency,
                            "protocol": record.protocol,
                            "payer": record.payer,
                            "payee": record.payee,
                        }),
                        gateway.clock.now(),
                    );
                    gateway.webhooks.emit(&webhook_event);

                    if let Some(request) = payout {
                        let bridge = Arc::clone(&gateway.bridge);
                        tokio::spawn(async move {
                            bridge.bridge(&record, &request).await;
                        });
                    }
                }
            }
        })
    }
}

/// Per-item admission result inside a batch run.
enum Slot {
    /// The item reached a terminal outcome during admission.
    Done(BatchItemOutcome),
    /// The item is authorized and joins the shared ledger round trip.
    Ready(ParsedSettlement),
}
