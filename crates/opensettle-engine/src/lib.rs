//! # opensettle-engine
//!
//! **Ledger Plane**: atomic balance movement and the settlement engine.
//!
//! ## Architecture
//!
//! 1. **[`Ledger`]**: wallets, settlement records, and the transactional
//!    outbox behind one critical section — the in-memory stand-in for a
//!    single database transaction
//! 2. **[`FeeBook`]**: fee schedules (basis points + flat)
//! 3. **[`SettlementEngine`]**: executes authorized commands, singly or
//!    as a batch sharing one ledger round trip
//!
//! ## Atomicity
//!
//! Debit payer, credit payee net-of-fee, credit fee to the platform
//! wallet, write the settlement record, append the outbox event — all
//! inside one lock acquisition. Either everything applies or nothing
//! does, and a client disconnecting mid-request cannot cancel a mutation
//! that has begun: the critical section is synchronous code with no
//! suspension point.

pub mod engine;
pub mod fees;
pub mod ledger;

pub use engine::SettlementEngine;
pub use fees::{FeeBook, FeeSchedule};
pub use ledger::Ledger;
