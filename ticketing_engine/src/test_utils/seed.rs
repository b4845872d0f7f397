//! Catalog seed data for tests. These wrap the same low-level insert functions the (external)
//! catalog and loyalty layers use in production.
use chrono::{DateTime, Duration, Utc};
use tix_common::Money;

use crate::{
    db_types::{Coupon, Event, LedgerEntry, NewCoupon, NewEvent, NewLedgerEntry, NewTicketType, NewVoucher, TicketType, Voucher},
    sqlite::db::{coupons, events, points, vouchers},
    SqliteDatabase,
};

pub async fn seed_event(db: &SqliteDatabase, organizer_id: i64, price: i64, seats: i64) -> Event {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    let event = NewEvent::new(organizer_id, "Rustfest Jakarta", Money::from(price), seats);
    events::insert_event(event, &mut conn).await.expect("Error seeding event")
}

pub async fn seed_unpublished_event(db: &SqliteDatabase, organizer_id: i64, price: i64, seats: i64) -> Event {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    let event = NewEvent::new(organizer_id, "Secret Warehouse Gig", Money::from(price), seats).unpublished();
    events::insert_event(event, &mut conn).await.expect("Error seeding event")
}

pub async fn seed_ticket_type(db: &SqliteDatabase, event_id: i64, name: &str, price: i64, seats: i64) -> TicketType {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    let tt = NewTicketType::new(event_id, name, Money::from(price), seats);
    events::insert_ticket_type(tt, &mut conn).await.expect("Error seeding ticket type")
}

/// A voucher that is currently active: its window opened yesterday and closes tomorrow.
pub async fn seed_voucher(
    db: &SqliteDatabase,
    event_id: i64,
    code: &str,
    amount: i64,
    max_uses: Option<i64>,
) -> Voucher {
    let now = Utc::now();
    seed_voucher_with_window(db, event_id, code, amount, max_uses, now - Duration::days(1), now + Duration::days(1))
        .await
}

pub async fn seed_voucher_with_window(
    db: &SqliteDatabase,
    event_id: i64,
    code: &str,
    amount: i64,
    max_uses: Option<i64>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Voucher {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    let mut voucher = NewVoucher::new(event_id, code, Money::from(amount), starts_at, ends_at);
    if let Some(max) = max_uses {
        voucher = voucher.with_max_uses(max);
    }
    vouchers::insert_voucher(voucher, &mut conn).await.expect("Error seeding voucher")
}

/// A coupon valid for another thirty days.
pub async fn seed_coupon(db: &SqliteDatabase, user_id: i64, code: &str, amount: i64) -> Coupon {
    seed_coupon_expiring(db, user_id, code, amount, Utc::now() + Duration::days(30)).await
}

pub async fn seed_coupon_expiring(
    db: &SqliteDatabase,
    user_id: i64,
    code: &str,
    amount: i64,
    expires_at: DateTime<Utc>,
) -> Coupon {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    let coupon = NewCoupon::new(user_id, code, Money::from(amount), expires_at);
    coupons::insert_coupon(coupon, &mut conn).await.expect("Error seeding coupon")
}

/// A plain point grant with no expiry, as the loyalty layer would issue.
pub async fn grant_points(db: &SqliteDatabase, user_id: i64, amount: i64) -> LedgerEntry {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    let entry = NewLedgerEntry::grant(user_id, Money::from(amount), None);
    points::insert_entry(entry, &mut conn).await.expect("Error granting points")
}

/// The user's full ledger, for asserting on debit/credit rows.
pub async fn ledger_for(db: &SqliteDatabase, user_id: i64) -> Vec<LedgerEntry> {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    points::entries_for_user(user_id, &mut conn).await.expect("Error fetching ledger")
}

/// Re-reads an event row, typically to assert on `remaining_seats`.
pub async fn fetch_event(db: &SqliteDatabase, event_id: i64) -> Event {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    events::fetch_event(event_id, &mut conn).await.expect("Error fetching event").expect("Event should exist")
}

/// Re-reads a ticket type row.
pub async fn fetch_ticket_type(db: &SqliteDatabase, ticket_type_id: i64) -> TicketType {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    events::fetch_ticket_type(ticket_type_id, &mut conn)
        .await
        .expect("Error fetching ticket type")
        .expect("Ticket type should exist")
}

/// Re-reads a voucher row, typically to assert on `used_count`.
pub async fn fetch_voucher(db: &SqliteDatabase, code: &str) -> Voucher {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    vouchers::fetch_voucher_by_code(code, &mut conn)
        .await
        .expect("Error fetching voucher")
        .expect("Voucher should exist")
}

/// Re-reads a coupon row, typically to assert on `used_at`.
pub async fn fetch_coupon(db: &SqliteDatabase, code: &str) -> Coupon {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    coupons::fetch_coupon_by_code(code, &mut conn)
        .await
        .expect("Error fetching coupon")
        .expect("Coupon should exist")
}
