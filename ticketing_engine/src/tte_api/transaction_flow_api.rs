use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use tix_common::Money;

use crate::{
    db_types::{Event, NewTransaction, Transaction, TransactionStatus},
    events::{EventProducers, TransactionAcceptedEvent, TransactionAnnulledEvent},
    traits::{CompensationOutcome, TicketingDatabase, TicketingError},
    transaction_objects::{CustomerTransaction, OrganizerTransaction, TransactionQueryFilter},
};

/// Customers get this long to upload a payment proof before the transaction expires.
pub const PAYMENT_WINDOW: Duration = Duration::hours(2);
/// Organizers get this long to accept or reject an uploaded proof before the transaction is
/// cancelled in the customer's favour.
pub const DECISION_WINDOW: Duration = Duration::days(3);

/// `TransactionFlowApi` is the primary API for driving purchase transactions through their
/// lifecycle: creation, payment-proof upload, and the organizer's decision. The deadline sweeper
/// ([`crate::Sweeper`]) shares the same backend and the same rollback engine, so compensation
/// semantics are identical no matter who triggers them.
pub struct TransactionFlowApi<B> {
    db: B,
    producers: EventProducers,
    payment_window: Duration,
    decision_window: Duration,
}

impl<B> Debug for TransactionFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionFlowApi")
    }
}

impl<B> TransactionFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, payment_window: PAYMENT_WINDOW, decision_window: DECISION_WINDOW }
    }

    /// Overrides the lifecycle windows. Meant for tests and staging environments; production
    /// uses the defaults.
    pub fn with_windows(mut self, payment_window: Duration, decision_window: Duration) -> Self {
        self.payment_window = payment_window;
        self.decision_window = decision_window;
        self
    }
}

impl<B> TransactionFlowApi<B>
where B: TicketingDatabase
{
    /// Submit a new purchase.
    ///
    /// The whole creation — seat reservation, voucher redemption, coupon claim, point debit and
    /// row insert — is one atomic unit in the backend: either the returned transaction exists
    /// with all its side effects applied, or nothing happened at all.
    ///
    /// A transaction whose payable total is zero is returned already `Done`; everything else
    /// starts waiting for payment.
    pub async fn create_transaction(&self, order: NewTransaction) -> Result<Transaction, TicketingError> {
        let now = Utc::now();
        let transaction = self.db.create_transaction(order, now, self.payment_window).await?;
        debug!(
            "🔄️🎟️ Transaction #{} created for customer {}: {} due by {}",
            transaction.id, transaction.customer_id, transaction.total_amount, transaction.payment_due_at
        );
        Ok(transaction)
    }

    /// Record the customer's proof of payment and hand the transaction to the organizer.
    ///
    /// Legal only for the transaction's own customer, only from `WaitingForPayment`, and only
    /// inside the payment window. A lapsed window does not let the upload quietly succeed: the
    /// transaction is driven to `Expired` through the rollback engine on the spot, and the
    /// caller gets `PaymentWindowExpired`.
    pub async fn upload_payment_proof(
        &self,
        transaction_id: i64,
        customer_id: i64,
        proof_url: &str,
    ) -> Result<Transaction, TicketingError> {
        let now = Utc::now();
        let transaction = self
            .db
            .fetch_transaction(transaction_id)
            .await?
            .ok_or(TicketingError::TransactionNotFound(transaction_id))?;
        if transaction.customer_id != customer_id {
            return Err(TicketingError::Forbidden(transaction_id));
        }
        if transaction.status != TransactionStatus::WaitingForPayment {
            return Err(TicketingError::InvalidTransition {
                id: transaction_id,
                status: transaction.status,
                action: "given payment proof",
            });
        }
        if now > transaction.payment_due_at {
            warn!("🔄️ Transaction #{transaction_id} received a proof after its payment window; expiring it");
            let outcome = self.db.compensate_transaction(transaction_id, TransactionStatus::Expired, now).await?;
            if let CompensationOutcome::Compensated(expired) = outcome {
                self.call_annulled_hook(&expired).await;
            }
            return Err(TicketingError::PaymentWindowExpired(transaction_id));
        }
        let updated = self.db.submit_payment_proof(transaction_id, proof_url, now, self.decision_window).await?;
        debug!(
            "🔄️🧾️ Proof uploaded for transaction #{transaction_id}; organizer decision due by {:?}",
            updated.decision_due_at
        );
        Ok(updated)
    }

    /// Accept the payment proof and finalize the transaction.
    ///
    /// Legal only for the organizer of the parent event, only from `WaitingForAdminConfirmation`
    /// and only once a proof URL is present. Fires a best-effort notification after the state
    /// change commits; a notification failure never rolls the acceptance back.
    pub async fn organizer_accept(&self, transaction_id: i64, organizer_id: i64) -> Result<Transaction, TicketingError> {
        let now = Utc::now();
        let (transaction, event) = self.load_for_organizer(transaction_id, organizer_id).await?;
        if transaction.status != TransactionStatus::WaitingForAdminConfirmation {
            return Err(TicketingError::InvalidTransition {
                id: transaction_id,
                status: transaction.status,
                action: "accepted",
            });
        }
        if !transaction.has_proof() {
            return Err(TicketingError::ProofMissing(transaction_id));
        }
        let updated = self.db.finalize_transaction(transaction_id, now).await?;
        info!("🔄️✅️ Transaction #{transaction_id} accepted by organizer {organizer_id}");
        self.call_accepted_hook(&updated, &event.name).await;
        Ok(updated)
    }

    /// Reject the payment proof. Invokes the rollback engine: seats, voucher use, coupon and
    /// points all return to the customer, and the transaction lands in `Rejected`.
    pub async fn organizer_reject(&self, transaction_id: i64, organizer_id: i64) -> Result<Transaction, TicketingError> {
        let now = Utc::now();
        let (transaction, _event) = self.load_for_organizer(transaction_id, organizer_id).await?;
        if transaction.status != TransactionStatus::WaitingForAdminConfirmation {
            return Err(TicketingError::InvalidTransition {
                id: transaction_id,
                status: transaction.status,
                action: "rejected",
            });
        }
        match self.db.compensate_transaction(transaction_id, TransactionStatus::Rejected, now).await? {
            CompensationOutcome::Compensated(rejected) => {
                info!("🔄️❌️ Transaction #{transaction_id} rejected by organizer {organizer_id}");
                self.call_annulled_hook(&rejected).await;
                Ok(rejected)
            },
            CompensationOutcome::AlreadySettled => {
                // Someone beat us between the status check and the claim — re-read for the error.
                let status = self
                    .db
                    .fetch_transaction(transaction_id)
                    .await?
                    .map(|t| t.status)
                    .unwrap_or(transaction.status);
                Err(TicketingError::InvalidTransition { id: transaction_id, status, action: "rejected" })
            },
        }
    }

    /// The customer's purchase history, newest first. Read-only.
    pub async fn transactions_for_customer(&self, customer_id: i64) -> Result<Vec<CustomerTransaction>, TicketingError> {
        self.db.transactions_for_customer(customer_id).await
    }

    /// Transactions across the organizer's events, optionally narrowed by event and status.
    /// Read-only.
    pub async fn transactions_for_organizer(
        &self,
        organizer_id: i64,
        query: TransactionQueryFilter,
    ) -> Result<Vec<OrganizerTransaction>, TicketingError> {
        self.db.transactions_for_organizer(organizer_id, query).await
    }

    /// Admin search across all transactions. Read-only.
    pub async fn search_transactions(&self, query: TransactionQueryFilter) -> Result<Vec<Transaction>, TicketingError> {
        self.db.search_transactions(query).await
    }

    /// The customer's current non-expired point balance.
    pub async fn points_balance(&self, user_id: i64) -> Result<Money, TicketingError> {
        self.db.points_balance(user_id, Utc::now()).await
    }

    /// Loads the transaction and its parent event, checking that `organizer_id` owns the event.
    /// `Forbidden` and `InvalidTransition` stay distinct error kinds so a caller can tell "not
    /// yours" apart from "already decided".
    async fn load_for_organizer(
        &self,
        transaction_id: i64,
        organizer_id: i64,
    ) -> Result<(Transaction, Event), TicketingError> {
        let transaction = self
            .db
            .fetch_transaction(transaction_id)
            .await?
            .ok_or(TicketingError::TransactionNotFound(transaction_id))?;
        let event = self
            .db
            .fetch_event(transaction.event_id)
            .await?
            .ok_or(TicketingError::EventNotFound(transaction.event_id))?;
        if event.organizer_id != organizer_id {
            return Err(TicketingError::Forbidden(transaction_id));
        }
        Ok((transaction, event))
    }

    async fn call_accepted_hook(&self, transaction: &Transaction, event_name: &str) {
        for emitter in &self.producers.transaction_accepted_producer {
            debug!("🔄️📬️ Notifying transaction-accepted subscribers");
            let event = TransactionAcceptedEvent::new(transaction.clone(), event_name.to_string());
            emitter.publish_event(event).await;
        }
    }

    async fn call_annulled_hook(&self, transaction: &Transaction) {
        if self.producers.transaction_annulled_producer.is_empty() {
            return;
        }
        // Best-effort enrichment: a failed name lookup must not block the notification.
        let event_name = match self.db.fetch_event(transaction.event_id).await {
            Ok(Some(event)) => event.name,
            Ok(None) => String::new(),
            Err(e) => {
                warn!("🔄️📬️ Could not fetch event {} for notification: {e}", transaction.event_id);
                String::new()
            },
        };
        for emitter in &self.producers.transaction_annulled_producer {
            debug!("🔄️📬️ Notifying transaction-annulled subscribers");
            let event = TransactionAnnulledEvent::new(transaction.clone(), event_name.clone());
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
