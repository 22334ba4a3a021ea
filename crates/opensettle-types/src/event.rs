//! Ledger outbox events.
//!
//! Side effects of a settlement (payout bridging, webhook dispatch) are
//! not in-process callbacks — they are [`LedgerEvent`]s appended to the
//! ledger's outbox **inside the same critical section** that writes the
//! settlement record, then drained by independent workers. A crash
//! between commit and dispatch loses nothing.

use serde::{Deserialize, Serialize};

use crate::{PayoutRequest, SettlementRecord};

/// An event written atomically alongside its causing ledger mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A settlement completed. Carries the payout request, if the
    /// originating command asked for local-rail bridging.
    SettlementCompleted {
        record: SettlementRecord,
        payout: Option<PayoutRequest>,
    },
}

impl LedgerEvent {
    /// The settlement record this event concerns.
    #[must_use]
    pub fn record(&self) -> &SettlementRecord {
        match self {
            Self::SettlementCompleted { record, .. } => record,
        }
    }
}
