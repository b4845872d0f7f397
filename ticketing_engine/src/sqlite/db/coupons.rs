//! Coupon rows. `used_at` is the single-use latch: setting it is conditional on it being NULL,
//! clearing it is how a rollback hands the coupon back to its owner.
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Coupon, NewCoupon},
    traits::TicketingError,
};

pub async fn insert_coupon(coupon: NewCoupon, conn: &mut SqliteConnection) -> Result<Coupon, TicketingError> {
    let code = coupon.code.clone();
    let coupon = sqlx::query_as(
        r#"
            INSERT INTO coupons (user_id, code, discount_amount, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(coupon.user_id)
    .bind(coupon.code)
    .bind(coupon.discount_amount)
    .bind(coupon.expires_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            TicketingError::Validation(format!("A coupon with code {code} already exists"))
        },
        _ => TicketingError::from(e),
    })?;
    Ok(coupon)
}

pub async fn fetch_coupon_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<Coupon>, sqlx::Error> {
    let coupon = sqlx::query_as("SELECT * FROM coupons WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(coupon)
}

pub async fn fetch_coupon(id: i64, conn: &mut SqliteConnection) -> Result<Option<Coupon>, sqlx::Error> {
    let coupon = sqlx::query_as("SELECT * FROM coupons WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(coupon)
}

/// Claims the coupon for a transaction. Conditional on `used_at IS NULL`, so two transactions
/// racing for the same coupon cannot both have it.
pub async fn mark_used(coupon_id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), TicketingError> {
    let result = sqlx::query(
        "UPDATE coupons SET used_at = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND used_at IS NULL",
    )
    .bind(now)
    .bind(coupon_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(TicketingError::InvalidCoupon("the coupon has already been used".to_string()));
    }
    debug!("🎫️ Coupon #{coupon_id} marked as used");
    Ok(())
}

/// Frees the coupon again. The caller also clears the transaction's coupon linkage so the
/// uniqueness constraint lets the coupon back a new transaction.
pub async fn release(coupon_id: i64, conn: &mut SqliteConnection) -> Result<(), TicketingError> {
    sqlx::query("UPDATE coupons SET used_at = NULL, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(coupon_id)
        .execute(conn)
        .await?;
    debug!("🎫️ Coupon #{coupon_id} released");
    Ok(())
}
