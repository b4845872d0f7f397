//! # SQLite database methods
//!
//! This module contains the "low-level" SQLite interactions, one submodule per table family.
//!
//! All interactions are maintained by simple functions (rather than stateful structs) that accept
//! a `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an
//! atomic transaction as the need arises and call through to the functions without any other
//! changes — the five-step creation unit and the compensation unit are composed exactly this way.
//!
//! Every mutation of a shared counter (seats, voucher uses, coupon availability) is a single
//! conditional UPDATE checked through `rows_affected`. There are no read-then-write pairs on
//! those columns anywhere in this tree.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod coupons;
pub mod events;
pub mod points;
pub mod transactions;
pub mod vouchers;

const SQLITE_DB_URL: &str = "sqlite://data/tix_store.db";

pub fn db_url() -> String {
    let result = env::var("TIX_DATABASE_URL").unwrap_or_else(|_| {
        info!("TIX_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    // WAL plus a busy timeout makes concurrent writers queue behind each other instead of
    // surfacing lock errors to the buyer.
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
