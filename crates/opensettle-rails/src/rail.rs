//! External rail ports and the corridor router.
//!
//! Each rail (Pix, SPEI) is an adapter behind [`RailAdapter`]; the bridge
//! selects one by the destination's corridor. The specific bank/PSP wire
//! protocol lives entirely inside the adapter — the bridge only sees
//! submit-and-reference semantics plus the transient/permanent error
//! split.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use opensettle_types::{Corridor, PayoutInstruction, Result, SettleError};

/// Port to one external local-currency rail.
#[async_trait]
pub trait RailAdapter: Send + Sync {
    /// The corridor this adapter serves.
    fn corridor(&self) -> Corridor;

    /// Submit an instruction to the rail. Returns the rail's external
    /// reference id.
    ///
    /// # Errors
    /// - [`SettleError::RailUnreachable`] for transient failures — the
    ///   bridge retries with backoff
    /// - [`SettleError::RailRejected`] for permanent rejections — the
    ///   bridge fails the payout immediately
    async fn submit(&self, instruction: &PayoutInstruction) -> Result<String>;
}

/// Corridor-keyed rail registry.
pub struct RailRouter {
    adapters: HashMap<Corridor, Arc<dyn RailAdapter>>,
}

impl RailRouter {
    /// An empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// A router with sandbox adapters for every corridor.
    #[must_use]
    pub fn with_sandbox_rails() -> Self {
        let mut router = Self::new();
        router.register(Arc::new(SandboxRail::new(Corridor::Pix)));
        router.register(Arc::new(SandboxRail::new(Corridor::Spei)));
        router
    }

    /// Register an adapter under its own corridor.
    pub fn register(&mut self, adapter: Arc<dyn RailAdapter>) {
        self.adapters.insert(adapter.corridor(), adapter);
    }

    /// The adapter for a corridor.
    ///
    /// # Errors
    /// Returns [`SettleError::UnsupportedCorridor`] when none is registered.
    pub fn route(&self, corridor: Corridor) -> Result<Arc<dyn RailAdapter>> {
        self.adapters
            .get(&corridor)
            .cloned()
            .ok_or_else(|| SettleError::UnsupportedCorridor {
                corridor: corridor.to_string(),
            })
    }

    /// Whether a corridor is reachable (the simulate pass asks this).
    #[must_use]
    pub fn supports(&self, corridor: Corridor) -> bool {
        self.adapters.contains_key(&corridor)
    }
}

impl Default for RailRouter {
    fn default() -> Self {
        Self::with_sandbox_rails()
    }
}

/// Always-succeeding rail adapter producing sequential references.
/// The stand-in for a PSP sandbox environment.
pub struct SandboxRail {
    corridor: Corridor,
    sequence: AtomicU64,
}

impl SandboxRail {
    #[must_use]
    pub fn new(corridor: Corridor) -> Self {
        Self {
            corridor,
            sequence: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl RailAdapter for SandboxRail {
    fn corridor(&self) -> Corridor {
        self.corridor
    }

    async fn submit(&self, _instruction: &PayoutInstruction) -> Result<String> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        Ok(format!("{}-{seq:08}", self.corridor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use opensettle_types::{PayoutId, PayoutStatus, RailDestination, SettlementId};

    fn instruction(corridor: Corridor) -> PayoutInstruction {
        let destination = match corridor {
            Corridor::Pix => RailDestination::Pix {
                pix_key: "maria@email.com".to_string(),
                pix_key_type: "email".to_string(),
                name: "Maria Silva".to_string(),
                tax_id: None,
            },
            Corridor::Spei => RailDestination::Spei {
                clabe: "002010077777777771".to_string(),
                name: "Juan Perez".to_string(),
                rfc: None,
            },
        };
        let now = Utc::now();
        PayoutInstruction {
            id: PayoutId::new(),
            settlement_id: SettlementId::new(),
            corridor,
            destination,
            source_amount: Decimal::new(100, 0),
            local_amount: Decimal::new(540, 0),
            local_currency: corridor.local_currency().to_string(),
            fx_rate: Decimal::new(54, 1),
            external_ref: None,
            status: PayoutStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn sandbox_rail_issues_sequential_refs() {
        let rail = SandboxRail::new(Corridor::Pix);
        let a = rail.submit(&instruction(Corridor::Pix)).await.unwrap();
        let b = rail.submit(&instruction(Corridor::Pix)).await.unwrap();
        assert!(a.starts_with("pix-"));
        assert_ne!(a, b);
    }

    #[test]
    fn router_routes_by_corridor() {
        let router = RailRouter::with_sandbox_rails();
        assert!(router.supports(Corridor::Pix));
        assert!(router.supports(Corridor::Spei));
        assert_eq!(router.route(Corridor::Pix).unwrap().corridor(), Corridor::Pix);
    }

    #[test]
    fn empty_router_rejects() {
        let router = RailRouter::new();
        assert!(!router.supports(Corridor::Pix));
        let err = router.route(Corridor::Pix).err().unwrap();
        assert!(matches!(err, SettleError::UnsupportedCorridor { .. }));
    }
}
