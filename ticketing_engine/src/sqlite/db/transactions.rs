//! Transaction rows: the aggregate's insert, reads, and the conditional state transitions.
//!
//! Every transition embeds its expected source state (and, for terminal moves, the
//! `decided_at IS NULL` guard) in the UPDATE's WHERE clause. A transition that returns no row
//! lost a race or was repeated; the caller maps that to a typed error or a no-op — the row is
//! never corrupted.
use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};
use tix_common::Money;

use crate::{
    db_types::{Transaction, TransactionStatus},
    traits::TicketingError,
    transaction_objects::{CustomerTransaction, OrganizerTransaction, TransactionQueryFilter},
};

/// Everything the creation flow has computed by the time the row is written: resolved discount
/// links, the capped amount breakdown, and the lifecycle fields for the initial state.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub customer_id: i64,
    pub event_id: i64,
    pub ticket_type_id: Option<i64>,
    pub qty: i64,
    pub subtotal_amount: Money,
    pub voucher_id: Option<i64>,
    pub voucher_discount: Money,
    pub coupon_id: Option<i64>,
    pub coupon_discount: Money,
    pub points_used: Money,
    pub total_amount: Money,
    pub status: TransactionStatus,
    pub payment_due_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

pub async fn insert(draft: TransactionDraft, conn: &mut SqliteConnection) -> Result<Transaction, TicketingError> {
    let transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                customer_id,
                event_id,
                ticket_type_id,
                qty,
                subtotal_amount,
                voucher_id,
                voucher_discount,
                coupon_id,
                coupon_discount,
                points_used,
                total_amount,
                status,
                payment_due_at,
                decided_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *;
        "#,
    )
    .bind(draft.customer_id)
    .bind(draft.event_id)
    .bind(draft.ticket_type_id)
    .bind(draft.qty)
    .bind(draft.subtotal_amount)
    .bind(draft.voucher_id)
    .bind(draft.voucher_discount)
    .bind(draft.coupon_id)
    .bind(draft.coupon_discount)
    .bind(draft.points_used)
    .bind(draft.total_amount)
    .bind(draft.status.to_string())
    .bind(draft.payment_due_at)
    .bind(draft.decided_at)
    .fetch_one(conn)
    .await?;
    Ok(transaction)
}

pub async fn fetch(id: i64, conn: &mut SqliteConnection) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(transaction)
}

/// Records the payment proof and advances the row, conditional on it still waiting for payment.
/// Returns `None` when the guard does not match (wrong state, or the row does not exist).
pub async fn submit_proof(
    id: i64,
    proof_url: &str,
    now: DateTime<Utc>,
    decision_due_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET
                payment_proof_url = $1,
                payment_proof_uploaded_at = $2,
                status = $3,
                decision_due_at = $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $5 AND status = $6
            RETURNING *;
        "#,
    )
    .bind(proof_url)
    .bind(now)
    .bind(TransactionStatus::WaitingForAdminConfirmation.to_string())
    .bind(decision_due_at)
    .bind(id)
    .bind(TransactionStatus::WaitingForPayment.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

/// Finalizes an accepted transaction, conditional on it awaiting confirmation and not yet
/// decided. Returns `None` when the guard does not match.
pub async fn finalize(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = $1,
                decided_at = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = $4 AND decided_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(TransactionStatus::Done.to_string())
    .bind(now)
    .bind(id)
    .bind(TransactionStatus::WaitingForAdminConfirmation.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

/// The compensation claim: the compare-and-set that makes the rollback engine idempotent. Moves
/// the row to its compensated terminal state only if it is still in `source` and undecided. The
/// returned row still carries the voucher/coupon/points linkage for the caller to reverse.
pub async fn claim_compensation(
    id: i64,
    new_status: TransactionStatus,
    source: TransactionStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = $1,
                decided_at = $2,
                decision_due_at = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = $4 AND decided_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(new_status.to_string())
    .bind(now)
    .bind(id)
    .bind(source.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

/// Detaches the coupon from a compensated transaction. The coupon id column is unique, so the
/// link must go before the freed coupon can back a new purchase.
pub async fn clear_coupon_link(id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE transactions SET coupon_id = NULL, coupon_discount = 0, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Zeroes the recorded point spend after the compensating credit has been appended, so later
/// reads of the row reflect the refund.
pub async fn zero_points_used(id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE transactions SET points_used = 0, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Transactions whose payment window closed with no proof uploaded.
pub async fn overdue_payment_ids(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let ids = sqlx::query_scalar(
        "SELECT id FROM transactions \
         WHERE status = $1 AND payment_due_at < $2 AND payment_proof_url IS NULL ORDER BY id ASC",
    )
    .bind(TransactionStatus::WaitingForPayment.to_string())
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// Transactions whose organizer decision window has closed.
pub async fn overdue_decision_ids(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    let ids = sqlx::query_scalar(
        "SELECT id FROM transactions WHERE status = $1 AND decision_due_at < $2 ORDER BY id ASC",
    )
    .bind(TransactionStatus::WaitingForAdminConfirmation.to_string())
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// Fetches transactions according to the criteria in the `TransactionQueryFilter`.
///
/// Resulting transactions are ordered by `created_at` in ascending order.
pub async fn search(
    query: TransactionQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM transactions
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(customer_id) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id);
    }
    if let Some(event_id) = query.event_id {
        where_clause.push("event_id = ");
        where_clause.push_bind_unseparated(event_id);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("📒️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Transaction>();
    let transactions = query.fetch_all(conn).await?;
    trace!("📒️ Result of search: {} row(s)", transactions.len());
    Ok(transactions)
}

/// The customer's purchase history, newest first, with enough event detail to render a list.
pub async fn for_customer(
    customer_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<CustomerTransaction>, sqlx::Error> {
    let rows = sqlx::query_as(
        r#"
        SELECT
            t.id,
            t.status,
            t.qty,
            t.total_amount,
            t.payment_due_at,
            t.decision_due_at,
            t.created_at,
            t.event_id,
            e.name AS event_name,
            e.starts_at AS event_starts_at,
            e.location AS event_location
        FROM transactions t JOIN events e ON t.event_id = e.id
        WHERE t.customer_id = $1
        ORDER BY t.created_at DESC, t.id DESC"#,
    )
    .bind(customer_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Transactions across an organizer's events, newest first, optionally narrowed by event and
/// status.
pub async fn for_organizer(
    organizer_id: i64,
    query: TransactionQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrganizerTransaction>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
        SELECT
            t.id,
            t.customer_id,
            t.status,
            t.qty,
            t.subtotal_amount,
            t.voucher_discount,
            t.coupon_discount,
            t.points_used,
            t.total_amount,
            t.payment_proof_url,
            t.created_at,
            t.event_id,
            e.name AS event_name
        FROM transactions t JOIN events e ON t.event_id = e.id
        WHERE e.organizer_id = "#,
    );
    builder.push_bind(organizer_id);
    if let Some(event_id) = query.event_id {
        builder.push(" AND t.event_id = ");
        builder.push_bind(event_id);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.status.as_ref().unwrap().iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        builder.push(format!(" AND t.status IN ({statuses})"));
    }
    builder.push(" ORDER BY t.created_at DESC, t.id DESC");

    trace!("📒️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<OrganizerTransaction>().fetch_all(conn).await?;
    Ok(rows)
}
