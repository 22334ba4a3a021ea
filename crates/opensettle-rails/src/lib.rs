//! # opensettle-rails
//!
//! **Payout Plane**: everything that happens after the ledger says
//! "settled" — fully asynchronous relative to the settlement response.
//!
//! ## Architecture
//!
//! 1. **[`PayoutBridge`]**: converts completed settlements into
//!    [`PayoutInstruction`](opensettle_types::PayoutInstruction)s, routes
//!    them by corridor, and drives the retry state machine
//! 2. **[`RailRouter`]** / **[`RailAdapter`]**: corridor-keyed external
//!    rail ports (Pix, SPEI)
//! 3. **[`FxTable`]**: settlement-currency → local-currency conversion
//! 4. **[`WebhookDispatcher`]**: at-least-once event delivery with
//!    retry, backoff, and a dead-letter queue
//!
//! ## Two State Machines
//!
//! The settlement record and the payout instruction are linked by
//! reference and recover independently: a permanently failed payout
//! never reverses the completed ledger movement. The pair is kept
//! auditable via [`PayoutBridge::failed_payouts`].

pub mod backoff;
pub mod bridge;
pub mod fx;
pub mod rail;
pub mod webhook;

pub use backoff::BackoffSchedule;
pub use bridge::PayoutBridge;
pub use fx::{FxQuote, FxTable};
pub use rail::{RailAdapter, RailRouter, SandboxRail};
pub use webhook::{WebhookDispatcher, WebhookTransport};
