use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tix_common::Money;

use crate::{
    db_types::{Event, NewTransaction, Transaction, TransactionStatus},
    traits::data_objects::CompensationOutcome,
    transaction_objects::{CustomerTransaction, OrganizerTransaction, TransactionQueryFilter},
};

/// This trait defines the storage behaviour backing the transaction lifecycle engine.
///
/// The methods are carved along atomic-unit boundaries: anything that must commit or fail as
/// one unit (the five-step creation flow, the compensation procedure, the conditional state
/// transitions) is a single trait method, so a backend cannot accidentally split it.
#[allow(async_fn_in_trait)]
pub trait TicketingDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Creates a transaction as one atomic unit: reserve seats, redeem the voucher, mark the
    /// coupon used, debit points, insert the row. Any failure unwinds every earlier step.
    ///
    /// Free transactions (payable total of zero) are inserted directly in `Done` with
    /// `decided_at = now`. Everything else starts in `WaitingForPayment` with
    /// `payment_due_at = now + payment_window`.
    async fn create_transaction(
        &self,
        new: NewTransaction,
        now: DateTime<Utc>,
        payment_window: Duration,
    ) -> Result<Transaction, TicketingError>;

    async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, TicketingError>;

    fn fetch_event(&self, id: i64) -> impl std::future::Future<Output = Result<Option<Event>, TicketingError>> + Send;

    /// Records the payment proof and moves the transaction to `WaitingForAdminConfirmation`,
    /// setting `decision_due_at = now + decision_window`. The update is conditional on the row
    /// still being in `WaitingForPayment`; losing that race surfaces as `InvalidTransition`.
    ///
    /// Deadline and ownership checks belong to the caller — this method only guards the state.
    async fn submit_payment_proof(
        &self,
        id: i64,
        proof_url: &str,
        now: DateTime<Utc>,
        decision_window: Duration,
    ) -> Result<Transaction, TicketingError>;

    /// Moves the transaction from `WaitingForAdminConfirmation` to `Done`, stamping
    /// `decided_at`. Conditional on the source state; a lost race is `InvalidTransition`.
    async fn finalize_transaction(&self, id: i64, now: DateTime<Utc>) -> Result<Transaction, TicketingError>;

    /// The rollback engine. Drives the transaction to `new_status` (one of `Rejected`,
    /// `Expired`, `Cancelled`) and reverses its side effects: seats restored (clamped at the
    /// total), voucher use returned (clamped at zero), coupon freed and unlinked, spent points
    /// re-credited with a fresh expiring ledger entry.
    ///
    /// The whole procedure is one atomic unit whose first statement is a compare-and-set on
    /// `status`/`decided_at`. Calling it twice — or concurrently — for the same transaction
    /// applies the side effects exactly once; later calls return `AlreadySettled`.
    fn compensate_transaction(
        &self,
        id: i64,
        new_status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<CompensationOutcome, TicketingError>> + Send;

    /// Ids of transactions still waiting for payment whose window closed with no proof uploaded.
    fn overdue_payment_ids(&self, now: DateTime<Utc>) -> impl std::future::Future<Output = Result<Vec<i64>, TicketingError>> + Send;

    /// Ids of transactions whose organizer decision window has closed.
    fn overdue_decision_ids(&self, now: DateTime<Utc>) -> impl std::future::Future<Output = Result<Vec<i64>, TicketingError>> + Send;

    /// Admin/test search across transactions. Read-only.
    async fn search_transactions(&self, query: TransactionQueryFilter) -> Result<Vec<Transaction>, TicketingError>;

    /// The customer's purchase history, newest first. Read-only projection.
    async fn transactions_for_customer(&self, customer_id: i64) -> Result<Vec<CustomerTransaction>, TicketingError>;

    /// Transactions across the organizer's events, newest first, optionally narrowed by event
    /// and status through `query`. Read-only projection.
    async fn transactions_for_organizer(
        &self,
        organizer_id: i64,
        query: TransactionQueryFilter,
    ) -> Result<Vec<OrganizerTransaction>, TicketingError>;

    /// The user's point balance: the sum of ledger entries that have not expired as of `now`.
    async fn points_balance(&self, user_id: i64, now: DateTime<Utc>) -> Result<Money, TicketingError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), TicketingError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum TicketingError {
    #[error("We have an internal database problem (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("The requested event {0} does not exist")]
    EventNotFound(i64),
    #[error("Event {0} is not published")]
    EventNotPublished(i64),
    #[error("The requested ticket type {0} does not exist for this event")]
    TicketTypeNotFound(i64),
    #[error("Not enough seats on {target}: requested {requested}, {remaining} remaining")]
    InsufficientInventory { target: String, requested: i64, remaining: i64 },
    #[error("Invalid voucher: {0}")]
    InvalidVoucher(String),
    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(i64),
    #[error("You do not have permission to act on transaction {0}")]
    Forbidden(i64),
    #[error("Transaction {id} is {status} and cannot be {action}")]
    InvalidTransition { id: i64, status: TransactionStatus, action: &'static str },
    #[error("The payment window for transaction {0} has closed")]
    PaymentWindowExpired(i64),
    #[error("Transaction {0} has no payment proof attached")]
    ProofMissing(i64),
}

impl From<sqlx::Error> for TicketingError {
    fn from(e: sqlx::Error) -> Self {
        TicketingError::DatabaseError(e.to_string())
    }
}
