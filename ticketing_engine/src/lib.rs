//! Ticketing Transaction Engine
//!
//! The transaction lifecycle engine for an event-ticketing marketplace. It owns the hard part of
//! the marketplace backend: reserving finite seat inventory, stacking discounts
//! (voucher → coupon → loyalty points), enforcing the payment and confirmation windows, and
//! compensating every transaction that fails to progress — exactly once, with no leaked seats and
//! no double-credited points.
//!
//! The library is divided into two main sections:
//! 1. Storage ([`mod@sqlite`]). SQLite is the reference backend. You should never need to touch
//!    the tables directly; use the public API instead. The row types in [`mod@db_types`] are the
//!    exception and are public.
//! 2. The engine public API ([`TransactionFlowApi`] and [`Sweeper`]). The API is generic over any
//!    backend implementing [`TicketingDatabase`], so the SQLite implementation can be swapped out
//!    without touching the lifecycle logic.
//!
//! The engine also emits events when transactions are accepted or annulled. A small hook system
//! ([`mod@events`]) lets the notification layer subscribe and send mail (or anything else)
//! without the engine taking a dependency on it. Hook failures are logged and never fail the
//! transition that triggered them.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;
mod tte_api;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{CompensationOutcome, SweepResult, TicketingDatabase, TicketingError};
pub use tte_api::{
    sweeper::{Sweeper, SweeperShutdown, DEFAULT_SWEEP_INTERVAL},
    transaction_flow_api::{TransactionFlowApi, DECISION_WINDOW, PAYMENT_WINDOW},
    transaction_objects,
};
