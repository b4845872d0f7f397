//! Event and ticket-type rows, and the seat-inventory accounting on both.
//!
//! Reservation and release are the concurrency-critical paths: two buyers racing for the last
//! seat are decided by a single conditional UPDATE, never by a check in Rust.
use log::{debug, warn};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Event, InventoryTarget, NewEvent, NewTicketType, TicketType},
    traits::TicketingError,
};

pub async fn insert_event(event: NewEvent, conn: &mut SqliteConnection) -> Result<Event, TicketingError> {
    let event = sqlx::query_as(
        r#"
            INSERT INTO events (organizer_id, name, location, starts_at, price, total_seats, remaining_seats, is_published)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(event.organizer_id)
    .bind(event.name)
    .bind(event.location)
    .bind(event.starts_at)
    .bind(event.price)
    .bind(event.total_seats)
    .bind(event.is_published)
    .fetch_one(conn)
    .await?;
    Ok(event)
}

pub async fn fetch_event(id: i64, conn: &mut SqliteConnection) -> Result<Option<Event>, sqlx::Error> {
    let event = sqlx::query_as("SELECT * FROM events WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(event)
}

pub async fn insert_ticket_type(tt: NewTicketType, conn: &mut SqliteConnection) -> Result<TicketType, TicketingError> {
    let tt = sqlx::query_as(
        r#"
            INSERT INTO ticket_types (event_id, name, price, total_seats, remaining_seats)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *;
        "#,
    )
    .bind(tt.event_id)
    .bind(tt.name)
    .bind(tt.price)
    .bind(tt.total_seats)
    .fetch_one(conn)
    .await?;
    Ok(tt)
}

pub async fn fetch_ticket_type(id: i64, conn: &mut SqliteConnection) -> Result<Option<TicketType>, sqlx::Error> {
    let tt = sqlx::query_as("SELECT * FROM ticket_types WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(tt)
}

/// Reserves `qty` seats on the target. The check and the decrement are one conditional UPDATE:
/// it only applies when enough seats remain, so concurrent reservations can never drive the
/// counter negative.
pub async fn reserve_seats(
    target: InventoryTarget,
    qty: i64,
    conn: &mut SqliteConnection,
) -> Result<(), TicketingError> {
    let query = match target {
        InventoryTarget::Event(_) => {
            "UPDATE events SET remaining_seats = remaining_seats - $1, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $2 AND remaining_seats >= $1"
        },
        InventoryTarget::TicketType(_) => {
            "UPDATE ticket_types SET remaining_seats = remaining_seats - $1, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $2 AND remaining_seats >= $1"
        },
    };
    let id = match target {
        InventoryTarget::Event(id) | InventoryTarget::TicketType(id) => id,
    };
    let result = sqlx::query(query).bind(qty).bind(id).execute(&mut *conn).await?;
    if result.rows_affected() > 0 {
        debug!("🎟️ Reserved {qty} seat(s) on {target}");
        return Ok(());
    }
    // The guard did not match: either the row is missing or the seats ran out. Disambiguate for
    // the caller; the read happens after the failed write, so it cannot mask a race.
    let remaining = match target {
        InventoryTarget::Event(id) => {
            fetch_event(id, conn).await?.ok_or(TicketingError::EventNotFound(id))?.remaining_seats
        },
        InventoryTarget::TicketType(id) => {
            fetch_ticket_type(id, conn).await?.ok_or(TicketingError::TicketTypeNotFound(id))?.remaining_seats
        },
    };
    Err(TicketingError::InsufficientInventory { target: target.to_string(), requested: qty, remaining })
}

/// Returns `qty` seats to the target, clamped at `total_seats` so a double release can never
/// inflate inventory past what the event was created with.
pub async fn release_seats(
    target: InventoryTarget,
    qty: i64,
    conn: &mut SqliteConnection,
) -> Result<(), TicketingError> {
    let query = match target {
        InventoryTarget::Event(_) => {
            "UPDATE events SET remaining_seats = MIN(total_seats, remaining_seats + $1), \
             updated_at = CURRENT_TIMESTAMP WHERE id = $2"
        },
        InventoryTarget::TicketType(_) => {
            "UPDATE ticket_types SET remaining_seats = MIN(total_seats, remaining_seats + $1), \
             updated_at = CURRENT_TIMESTAMP WHERE id = $2"
        },
    };
    let id = match target {
        InventoryTarget::Event(id) | InventoryTarget::TicketType(id) => id,
    };
    let result = sqlx::query(query).bind(qty).bind(id).execute(conn).await?;
    if result.rows_affected() == 0 {
        // The target row was deleted out from under the transaction. Nothing to restore.
        warn!("🎟️ Tried to release {qty} seat(s) on {target}, but it no longer exists");
    } else {
        debug!("🎟️ Released {qty} seat(s) back to {target}");
    }
    Ok(())
}
