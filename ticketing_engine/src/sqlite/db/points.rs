//! The append-only point ledger.
//!
//! Balances are always computed, never stored: the balance for a user is the sum of their
//! entries that have not expired yet. Debits and refunds are fresh rows; no entry is ever edited
//! or deleted, which is what makes the rollback credit safe to apply exactly once.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tix_common::Money;

use crate::db_types::{LedgerEntry, NewLedgerEntry};

pub async fn balance_for_user(
    user_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Money, sqlx::Error> {
    let balance: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM point_ledger \
         WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > $2)",
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(Money::from(balance))
}

pub async fn insert_entry(entry: NewLedgerEntry, conn: &mut SqliteConnection) -> Result<LedgerEntry, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"
            INSERT INTO point_ledger (user_id, amount, reason, transaction_id, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.amount)
    .bind(entry.reason)
    .bind(entry.transaction_id)
    .bind(entry.expires_at)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

/// Full ledger history for a user, oldest first. Used for support tooling and tests.
pub async fn entries_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM point_ledger WHERE user_id = $1 ORDER BY id ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
