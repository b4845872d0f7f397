//! `SqliteDatabase` is the concrete SQLite backend for the ticketing transaction engine.
//!
//! Each trait method is one atomic unit: it opens a pool transaction, composes the low-level
//! functions in [`super::db`], and commits once. The creation flow and the rollback engine both
//! start with a write so the connection holds the database write lock before any validation
//! read happens inside the unit — a failed validation rolls the whole unit back, side effects
//! included.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Months, Utc};
use log::*;
use sqlx::SqlitePool;
use tix_common::Money;

use super::db::{coupons, db_url, events, new_pool, points, transactions, vouchers};
use crate::{
    db_types::{
        Event,
        InventoryTarget,
        NewLedgerEntry,
        NewTransaction,
        Transaction,
        TransactionStatus,
    },
    helpers::discounts::{self, DiscountInputs},
    sqlite::db::transactions::TransactionDraft,
    traits::{CompensationOutcome, TicketingDatabase, TicketingError},
    transaction_objects::{CustomerTransaction, OrganizerTransaction, TransactionQueryFilter},
};

/// How long refunded points stay spendable. Mirrors the ordinary point-grant policy so a refund
/// is not an immortal balance.
const POINT_REFUND_TTL_MONTHS: u32 = 3;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl TicketingDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    /// The five-step creation unit. Order matters twice over: the seat reservation comes first
    /// so the write lock is held for the whole unit, and voucher → coupon → points is the
    /// product's discount-stacking order.
    async fn create_transaction(
        &self,
        new: NewTransaction,
        now: DateTime<Utc>,
        payment_window: Duration,
    ) -> Result<Transaction, TicketingError> {
        if new.qty < 1 {
            return Err(TicketingError::Validation(format!("qty must be at least 1, got {}", new.qty)));
        }
        let mut tx = self.pool.begin().await?;

        // 1. Reserve seats. Conditional decrement; failing it aborts the unit with no effects.
        let target = InventoryTarget::new(new.event_id, new.ticket_type_id);
        events::reserve_seats(target, new.qty, &mut tx).await?;

        let event = events::fetch_event(new.event_id, &mut tx)
            .await?
            .ok_or(TicketingError::EventNotFound(new.event_id))?;
        if !event.is_published {
            return Err(TicketingError::EventNotPublished(event.id));
        }
        // Price source: the ticket type when one was named, else the event. Frozen into the row.
        let unit_price = match new.ticket_type_id {
            Some(tt_id) => {
                let tt = events::fetch_ticket_type(tt_id, &mut tx)
                    .await?
                    .filter(|tt| tt.event_id == event.id)
                    .ok_or(TicketingError::TicketTypeNotFound(tt_id))?;
                tt.price
            },
            None => event.price,
        };
        let subtotal = unit_price * new.qty;

        // 2. Redeem the voucher. The use-count increment is guarded in the UPDATE itself.
        let (voucher_id, voucher_amount) = match new.voucher_code.as_deref() {
            Some(code) => {
                let voucher = vouchers::fetch_voucher_by_code(code, &mut tx)
                    .await?
                    .filter(|v| v.event_id == event.id)
                    .ok_or_else(|| TicketingError::InvalidVoucher("the code is not valid for this event".to_string()))?;
                if !voucher.is_active_at(now) {
                    return Err(TicketingError::InvalidVoucher("the voucher is outside its activity window".to_string()));
                }
                vouchers::redeem(voucher.id, &mut tx).await?;
                (Some(voucher.id), Some(voucher.discount_amount))
            },
            None => (None, None),
        };

        // 3. Claim the coupon. Guarded by `used_at IS NULL`.
        let (coupon_id, coupon_amount) = match new.coupon_code.as_deref() {
            Some(code) => {
                let coupon = coupons::fetch_coupon_by_code(code, &mut tx)
                    .await?
                    .filter(|c| c.user_id == new.customer_id)
                    .ok_or_else(|| TicketingError::InvalidCoupon("the code does not belong to you".to_string()))?;
                if coupon.is_expired_at(now) {
                    return Err(TicketingError::InvalidCoupon("the coupon has expired".to_string()));
                }
                coupons::mark_used(coupon.id, now, &mut tx).await?;
                (Some(coupon.id), Some(coupon.discount_amount))
            },
            None => (None, None),
        };

        // 4. Stack the discounts and debit points.
        let available_points = points::balance_for_user(new.customer_id, now, &mut tx).await?;
        let breakdown = discounts::stack(DiscountInputs {
            subtotal,
            voucher_discount: voucher_amount,
            coupon_discount: coupon_amount,
            requested_points: new.requested_points,
            available_points,
        });
        if breakdown.points_used > Money::zero() {
            points::insert_entry(NewLedgerEntry::spend(new.customer_id, breakdown.points_used), &mut tx).await?;
        }

        // 5. Insert the row. Free transactions never enter the payment wait.
        let is_free = breakdown.total.is_zero();
        let draft = TransactionDraft {
            customer_id: new.customer_id,
            event_id: event.id,
            ticket_type_id: new.ticket_type_id,
            qty: new.qty,
            subtotal_amount: subtotal,
            voucher_id,
            voucher_discount: breakdown.voucher_discount,
            coupon_id,
            coupon_discount: breakdown.coupon_discount,
            points_used: breakdown.points_used,
            total_amount: breakdown.total,
            status: if is_free { TransactionStatus::Done } else { TransactionStatus::WaitingForPayment },
            payment_due_at: if is_free { now } else { now + payment_window },
            decided_at: is_free.then_some(now),
        };
        let transaction = transactions::insert(draft, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Transaction #{} created for customer {}: {} ({})",
            transaction.id, transaction.customer_id, transaction.total_amount, transaction.status
        );
        Ok(transaction)
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        let transaction = transactions::fetch(id, &mut conn).await?;
        Ok(transaction)
    }

    async fn fetch_event(&self, id: i64) -> Result<Option<Event>, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        let event = events::fetch_event(id, &mut conn).await?;
        Ok(event)
    }

    async fn submit_payment_proof(
        &self,
        id: i64,
        proof_url: &str,
        now: DateTime<Utc>,
        decision_window: Duration,
    ) -> Result<Transaction, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        let decision_due_at = now + decision_window;
        match transactions::submit_proof(id, proof_url, now, decision_due_at, &mut conn).await? {
            Some(transaction) => {
                debug!("🗃️ Payment proof recorded for transaction #{id}");
                Ok(transaction)
            },
            None => Err(wrong_state(id, "given payment proof", &mut conn).await?),
        }
    }

    async fn finalize_transaction(&self, id: i64, now: DateTime<Utc>) -> Result<Transaction, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        match transactions::finalize(id, now, &mut conn).await? {
            Some(transaction) => {
                debug!("🗃️ Transaction #{id} finalized as Done");
                Ok(transaction)
            },
            None => Err(wrong_state(id, "accepted", &mut conn).await?),
        }
    }

    /// The rollback engine. The claim is the unit's first statement; everything after it only
    /// runs on the one call that wins the claim, which is what makes repeated or concurrent
    /// compensation a no-op.
    async fn compensate_transaction(
        &self,
        id: i64,
        new_status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<CompensationOutcome, TicketingError> {
        let source = new_status.compensation_source().ok_or_else(|| {
            TicketingError::Validation(format!("{new_status} is not a compensated terminal status"))
        })?;
        let mut tx = self.pool.begin().await?;
        let Some(claimed) = transactions::claim_compensation(id, new_status, source, now, &mut tx).await? else {
            return match transactions::fetch(id, &mut tx).await? {
                None => Err(TicketingError::TransactionNotFound(id)),
                Some(_) => Ok(CompensationOutcome::AlreadySettled),
            };
        };

        events::release_seats(claimed.inventory_target(), claimed.qty, &mut tx).await?;
        if let Some(voucher_id) = claimed.voucher_id {
            vouchers::release(voucher_id, &mut tx).await?;
        }
        if let Some(coupon_id) = claimed.coupon_id {
            coupons::release(coupon_id, &mut tx).await?;
            transactions::clear_coupon_link(claimed.id, &mut tx).await?;
        }
        if claimed.points_used > Money::zero() {
            let expires_at = now + Months::new(POINT_REFUND_TTL_MONTHS);
            let credit = NewLedgerEntry::rollback_credit(claimed.customer_id, claimed.points_used, claimed.id, expires_at);
            points::insert_entry(credit, &mut tx).await?;
            transactions::zero_points_used(claimed.id, &mut tx).await?;
        }
        let settled = transactions::fetch(claimed.id, &mut tx).await?.ok_or_else(|| {
            TicketingError::DatabaseError(format!("Transaction {id} vanished mid-compensation"))
        })?;
        tx.commit().await?;
        debug!("🗃️ Transaction #{id} compensated to {new_status}");
        Ok(CompensationOutcome::Compensated(settled))
    }

    async fn overdue_payment_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        let ids = transactions::overdue_payment_ids(now, &mut conn).await?;
        Ok(ids)
    }

    async fn overdue_decision_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        let ids = transactions::overdue_decision_ids(now, &mut conn).await?;
        Ok(ids)
    }

    async fn search_transactions(&self, query: TransactionQueryFilter) -> Result<Vec<Transaction>, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        let transactions = transactions::search(query, &mut conn).await?;
        Ok(transactions)
    }

    async fn transactions_for_customer(&self, customer_id: i64) -> Result<Vec<CustomerTransaction>, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        let rows = transactions::for_customer(customer_id, &mut conn).await?;
        Ok(rows)
    }

    async fn transactions_for_organizer(
        &self,
        organizer_id: i64,
        query: TransactionQueryFilter,
    ) -> Result<Vec<OrganizerTransaction>, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        let rows = transactions::for_organizer(organizer_id, query, &mut conn).await?;
        Ok(rows)
    }

    async fn points_balance(&self, user_id: i64, now: DateTime<Utc>) -> Result<Money, TicketingError> {
        let mut conn = self.pool.acquire().await?;
        let balance = points::balance_for_user(user_id, now, &mut conn).await?;
        Ok(balance)
    }

    async fn close(&mut self) -> Result<(), TicketingError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Builds the error for a conditional transition that matched no row: the transaction either
/// does not exist or sits in a state the transition is not legal from.
async fn wrong_state(
    id: i64,
    action: &'static str,
    conn: &mut sqlx::SqliteConnection,
) -> Result<TicketingError, TicketingError> {
    match transactions::fetch(id, conn).await? {
        None => Ok(TicketingError::TransactionNotFound(id)),
        Some(t) => Ok(TicketingError::InvalidTransition { id, status: t.status, action }),
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
