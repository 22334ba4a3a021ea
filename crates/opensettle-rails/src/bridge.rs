//! Local rail bridge — completed settlements become payout instructions.
//!
//! Fully asynchronous relative to the settlement response: the payer was
//! told "settled" when the ledger movement committed; the payout's fate
//! arrives later via webhook or status polling.
//!
//! Transient rail failures (`rail-unreachable`, submit timeouts) retry
//! with exponential backoff up to a bounded attempt budget. Permanent
//! rejections and exhausted budgets mark the instruction `Failed`
//! **without reversing the settlement** — the two state machines are
//! linked by reference and recovered independently, and the failed pairs
//! stay auditable through [`PayoutBridge::failed_payouts`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use rust_decimal::Decimal;
use tracing::{info, warn};

use opensettle_types::{
    Clock, Corridor, EventType, PayoutId, PayoutInstruction, PayoutRequest, PayoutStatus,
    RailConfig, Result, SettleError, SettlementId, SettlementRecord, SharedClock, WebhookEvent,
};

use crate::backoff::BackoffSchedule;
use crate::fx::FxTable;
use crate::rail::RailRouter;
use crate::webhook::WebhookDispatcher;

/// The bridge between the ledger plane and external local rails.
pub struct PayoutBridge {
    router: RailRouter,
    fx: FxTable,
    webhooks: Arc<WebhookDispatcher>,
    backoff: BackoffSchedule,
    max_attempts: u32,
    submit_timeout: StdDuration,
    instructions: Mutex<HashMap<PayoutId, PayoutInstruction>>,
    by_settlement: Mutex<HashMap<SettlementId, PayoutId>>,
    clock: SharedClock,
}

impl PayoutBridge {
    #[must_use]
    pub fn new(
        config: &RailConfig,
        router: RailRouter,
        fx: FxTable,
        webhooks: Arc<WebhookDispatcher>,
        clock: SharedClock,
    ) -> Self {
        Self {
            router,
            fx,
            webhooks,
            backoff: BackoffSchedule::new(config.base_backoff_ms, config.max_backoff_ms),
            max_attempts: config.max_attempts.max(1),
            submit_timeout: StdDuration::from_millis(config.submit_timeout_ms),
            instructions: Mutex::new(HashMap::new()),
            by_settlement: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Whether a corridor has a registered rail (the simulate pass asks).
    #[must_use]
    pub fn supports(&self, corridor: Corridor) -> bool {
        self.router.supports(corridor)
    }

    /// Price a corridor conversion without creating anything — the quote
    /// surface callers hit before committing a payout.
    pub fn quote(
        &self,
        currency: &str,
        corridor: Corridor,
        amount: Decimal,
    ) -> Result<crate::fx::FxQuote> {
        self.fx.quote(
            currency,
            corridor.local_currency(),
            amount,
            self.clock.now(),
        )
    }

    /// Destination reachability check for the simulate pass: corridor
    /// registered and an FX rate on file. No state is touched.
    pub fn preflight(
        &self,
        currency: &str,
        destination: &opensettle_types::RailDestination,
    ) -> Result<()> {
        let corridor = destination.corridor();
        if !self.router.supports(corridor) {
            return Err(SettleError::UnsupportedCorridor {
                corridor: corridor.to_string(),
            });
        }
        self.fx
            .quote(
                currency,
                corridor.local_currency(),
                Decimal::ONE,
                self.clock.now(),
            )
            .map(|_| ())
    }

    /// Bridge one completed settlement to its local rail, driving the
    /// instruction to a terminal status. Returns the payout id.
    pub async fn bridge(&self, record: &SettlementRecord, request: &PayoutRequest) -> PayoutId {
        let corridor = request.destination.corridor();
        let now = self.clock.now();

        // Quote the net amount into the corridor's local currency.
        let quote = self
            .fx
            .quote(&record.currency, corridor.local_currency(), record.net, now);
        let (local_amount, fx_rate, quote_err) = match quote {
            Ok(quote) => (quote.to_amount, quote.rate, None),
            Err(err) => (Decimal::ZERO, Decimal::ZERO, Some(err)),
        };

        let instruction = PayoutInstruction {
            id: PayoutId::new(),
            settlement_id: record.id,
            corridor,
            destination: request.destination.clone(),
            source_amount: record.net,
            local_amount,
            local_currency: corridor.local_currency().to_string(),
            fx_rate,
            external_ref: None,
            status: PayoutStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let payout_id = instruction.id;
        self.store(instruction.clone());
        self.by_settlement
            .lock()
            .expect("bridge index poisoned")
            .insert(record.id, payout_id);

        if let Some(err) = quote_err {
            self.fail(instruction, &err);
            return payout_id;
        }

        self.drive(instruction).await;
        payout_id
    }

    /// The submission loop: attempt, classify, back off, repeat.
    async fn drive(&self, mut instruction: PayoutInstruction) {
        let adapter = match self.router.route(instruction.corridor) {
            Ok(adapter) => adapter,
            Err(err) => {
                self.fail(instruction, &err);
                return;
            }
        };

        loop {
            instruction.attempts += 1;
            if instruction.status == PayoutStatus::Pending {
                let now = self.clock.now();
                // Pending → Submitted on the first hand-off to the rail.
                if instruction.transition(PayoutStatus::Submitted, now).is_err() {
                    return;
                }
            }
            self.store(instruction.clone());

            let submitted =
                tokio::time::timeout(self.submit_timeout, adapter.submit(&instruction)).await;
            match submitted {
                Ok(Ok(external_ref)) => {
                    instruction.external_ref = Some(external_ref);
                    let now = self.clock.now();
                    let _ = instruction.transition(PayoutStatus::Completed, now);
                    self.store(instruction.clone());
                    info!(
                        payout = %instruction.id,
                        settlement = %instruction.settlement_id,
                        corridor = %instruction.corridor,
                        attempts = instruction.attempts,
                        "payout completed"
                    );
                    self.emit(&instruction, EventType::PayoutCompleted);
                    return;
                }
                Ok(Err(err @ SettleError::RailRejected { .. })) => {
                    // Permanent: no retry will change the rail's mind.
                    self.fail(instruction, &err);
                    return;
                }
                Ok(Err(err)) => {
                    instruction.last_error = Some(err.to_string());
                }
                Err(_) => {
                    instruction.last_error = Some(
                        SettleError::RailUnreachable {
                            reason: "submission timed out".to_string(),
                        }
                        .to_string(),
                    );
                }
            }

            if instruction.attempts >= self.max_attempts {
                let err = SettleError::RailUnreachable {
                    reason: format!("retries exhausted after {} attempts", instruction.attempts),
                };
                self.fail(instruction, &err);
                return;
            }
            tokio::time::sleep(self.backoff.delay_for(instruction.attempts)).await;
        }
    }

    /// Terminal failure: record the reason, emit `payout.failed`, and
    /// leave the settlement record exactly as it was.
    fn fail(&self, mut instruction: PayoutInstruction, err: &SettleError) {
        let now = self.clock.now();
        instruction.last_error = Some(err.to_string());
        let _ = instruction.transition(PayoutStatus::Failed, now);
        self.store(instruction.clone());
        warn!(
            payout = %instruction.id,
            settlement = %instruction.settlement_id,
            attempts = instruction.attempts,
            error = %err,
            "payout failed; settlement stands"
        );
        self.emit(&instruction, EventType::PayoutFailed);
    }

    fn emit(&self, instruction: &PayoutInstruction, event_type: EventType) {
        let event = WebhookEvent::new(
            event_type,
            instruction.settlement_id,
            serde_json::json!({
                "payout_id": instruction.id,
                "corridor": instruction.corridor,
                "local_amount": instruction.local_amount,
                "local_currency": instruction.local_currency,
                "external_ref": instruction.external_ref,
                "attempts": instruction.attempts,
                "last_error": instruction.last_error,
            }),
            self.clock.now(),
        );
        self.webhooks.emit(&event);
    }

    fn store(&self, instruction: PayoutInstruction) {
        let mut instructions = self.instructions.lock().expect("bridge store poisoned");
        instructions.insert(instruction.id, instruction);
    }

    /// Payout status by settlement id — the polling surface.
    #[must_use]
    pub fn status_for_settlement(&self, settlement_id: SettlementId) -> Option<PayoutInstruction> {
        let payout_id = *self
            .by_settlement
            .lock()
            .expect("bridge index poisoned")
            .get(&settlement_id)?;
        self.instructions
            .lock()
            .expect("bridge store poisoned")
            .get(&payout_id)
            .cloned()
    }

    /// Every ledger-completed/payout-failed pair — the audit view feeding
    /// manual or scheduled reconciliation.
    #[must_use]
    pub fn failed_payouts(&self) -> Vec<PayoutInstruction> {
        self.instructions
            .lock()
            .expect("bridge store poisoned")
            .values()
            .filter(|instruction| instruction.status == PayoutStatus::Failed)
            .cloned()
            .collect()
    }
}
