//! Voucher rows and their redemption accounting.
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewVoucher, Voucher},
    traits::TicketingError,
};

pub async fn insert_voucher(voucher: NewVoucher, conn: &mut SqliteConnection) -> Result<Voucher, TicketingError> {
    let code = voucher.code.clone();
    let voucher = sqlx::query_as(
        r#"
            INSERT INTO vouchers (event_id, code, discount_amount, starts_at, ends_at, max_uses)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(voucher.event_id)
    .bind(voucher.code)
    .bind(voucher.discount_amount)
    .bind(voucher.starts_at)
    .bind(voucher.ends_at)
    .bind(voucher.max_uses)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            TicketingError::Validation(format!("A voucher with code {code} already exists"))
        },
        _ => TicketingError::from(e),
    })?;
    Ok(voucher)
}

pub async fn fetch_voucher_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<Voucher>, sqlx::Error> {
    let voucher = sqlx::query_as("SELECT * FROM vouchers WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(voucher)
}

/// Consumes one use of the voucher. The `used_count < max_uses` guard lives in the UPDATE
/// itself, so concurrent redemptions of a capped voucher cannot take it past the cap — exactly
/// `max_uses` of them will win.
pub async fn redeem(voucher_id: i64, conn: &mut SqliteConnection) -> Result<(), TicketingError> {
    let result = sqlx::query(
        "UPDATE vouchers SET used_count = used_count + 1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $1 AND (max_uses IS NULL OR used_count < max_uses)",
    )
    .bind(voucher_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(TicketingError::InvalidVoucher("the voucher has no uses remaining".to_string()));
    }
    debug!("🏷️ Voucher #{voucher_id} redeemed");
    Ok(())
}

/// Returns one use to the voucher, clamped at zero. Safe under repeated compensation because the
/// rollback engine only reaches it once per transaction.
pub async fn release(voucher_id: i64, conn: &mut SqliteConnection) -> Result<(), TicketingError> {
    sqlx::query(
        "UPDATE vouchers SET used_count = MAX(0, used_count - 1), updated_at = CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(voucher_id)
    .execute(conn)
    .await?;
    debug!("🏷️ Voucher #{voucher_id} released");
    Ok(())
}
