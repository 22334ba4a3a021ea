//! Webhook dispatcher — at-least-once delivery, never blocking settlement.
//!
//! One delivery task per (event, endpoint) pair: bounded-timeout attempts,
//! exponential backoff between them, and a dead-letter queue once the
//! attempt budget is spent. Consumers deduplicate on `event_id`, since
//! at-least-once delivery permits duplicates.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use opensettle_types::{
    Clock, DeliveryOutcome, Result, SettleError, SharedClock, WebhookConfig,
    WebhookDeliveryAttempt, WebhookEvent,
};

use crate::backoff::BackoffSchedule;

/// Port to the transport that actually reaches the target URL.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Deliver one payload. `Ok` means the endpoint acknowledged it.
    async fn deliver(&self, url: &str, payload: &Value) -> Result<()>;
}

/// The dispatcher: fan-out to subscribed endpoints with retry/backoff.
pub struct WebhookDispatcher {
    transport: Arc<dyn WebhookTransport>,
    endpoints: RwLock<Vec<String>>,
    dead_letters: Mutex<Vec<WebhookDeliveryAttempt>>,
    backoff: BackoffSchedule,
    max_attempts: u32,
    deliver_timeout: StdDuration,
    clock: SharedClock,
}

impl WebhookDispatcher {
    #[must_use]
    pub fn new(
        config: &WebhookConfig,
        transport: Arc<dyn WebhookTransport>,
        clock: SharedClock,
    ) -> Self {
        Self {
            transport,
            endpoints: RwLock::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            backoff: BackoffSchedule::new(config.base_backoff_ms, config.max_backoff_ms),
            max_attempts: config.max_attempts.max(1),
            deliver_timeout: StdDuration::from_millis(config.deliver_timeout_ms),
            clock,
        }
    }

    /// Subscribe an endpoint to the event feed.
    pub fn subscribe(&self, url: impl Into<String>) {
        let mut endpoints = self.endpoints.write().expect("endpoints poisoned");
        endpoints.push(url.into());
    }

    /// Fan an event out to every subscribed endpoint. Returns immediately;
    /// the delivery loops run as detached tasks.
    pub fn emit(self: &Arc<Self>, event: &WebhookEvent) {
        let endpoints = self.endpoints.read().expect("endpoints poisoned").clone();
        for url in endpoints {
            let dispatcher = Arc::clone(self);
            let event = event.clone();
            tokio::spawn(async move {
                dispatcher.deliver_with_retry(event, url).await;
            });
        }
    }

    /// Drive one (event, endpoint) delivery to a terminal outcome.
    pub async fn deliver_with_retry(&self, event: WebhookEvent, url: String) -> DeliveryOutcome {
        let payload = event.payload();
        let mut attempt = WebhookDeliveryAttempt {
            event,
            target_url: url,
            attempts: 0,
            next_attempt_at: self.clock.now(),
            outcome: DeliveryOutcome::Pending,
            last_error: None,
        };

        while attempt.attempts < self.max_attempts {
            attempt.attempts += 1;

            let delivery =
                tokio::time::timeout(self.deliver_timeout, self.transport.deliver(&attempt.target_url, &payload))
                    .await;
            match delivery {
                Ok(Ok(())) => {
                    attempt.outcome = DeliveryOutcome::Delivered;
                    info!(
                        event = %attempt.event.event_id,
                        url = %attempt.target_url,
                        attempts = attempt.attempts,
                        "webhook delivered"
                    );
                    return DeliveryOutcome::Delivered;
                }
                Ok(Err(err)) => {
                    attempt.last_error = Some(err.to_string());
                }
                Err(_) => {
                    attempt.last_error = Some(
                        SettleError::WebhookDeliveryFailed {
                            reason: "delivery timed out".to_string(),
                        }
                        .to_string(),
                    );
                }
            }

            if attempt.attempts < self.max_attempts {
                let delay = self.backoff.delay_for(attempt.attempts);
                attempt.next_attempt_at =
                    self.clock.now() + chrono::Duration::milliseconds(
                        i64::try_from(delay.as_millis()).unwrap_or(i64::MAX),
                    );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            event = %attempt.event.event_id,
            url = %attempt.target_url,
            attempts = attempt.attempts,
            "webhook dead-lettered"
        );
        attempt.outcome = DeliveryOutcome::DeadLettered;
        let mut dead = self.dead_letters.lock().expect("dead letters poisoned");
        dead.push(attempt);
        DeliveryOutcome::DeadLettered
    }

    /// The dead-letter queue, for inspection and manual replay.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<WebhookDeliveryAttempt> {
        self.dead_letters.lock().expect("dead letters poisoned").clone()
    }
}
