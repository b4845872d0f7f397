use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use tix_common::Money;

/// Ledger tag for point debits made while creating a transaction.
pub const LEDGER_REASON_SPEND: &str = "USED_IN_TRANSACTION";
/// Ledger tag for the compensating credit appended by a rollback.
pub const LEDGER_REASON_ROLLBACK: &str = "ROLLBACK";

//--------------------------------- TransactionStatus -----------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Created and awaiting the customer's proof of payment.
    WaitingForPayment,
    /// Proof uploaded; awaiting the organizer's accept/reject decision.
    WaitingForAdminConfirmation,
    /// Finalized. Reached by organizer acceptance, or directly at creation for free transactions.
    Done,
    /// The organizer rejected the payment proof. Compensated.
    Rejected,
    /// The payment window lapsed with no proof. Compensated.
    Expired,
    /// The decision window lapsed with no organizer decision. Compensated.
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Rejected | Self::Expired | Self::Cancelled)
    }

    /// The only status a compensation to `self` may start from. The compensation claim embeds
    /// this in its conditional update, so a transaction that moved on since it was selected for
    /// compensation is left alone.
    pub fn compensation_source(&self) -> Option<TransactionStatus> {
        match self {
            Self::Expired => Some(Self::WaitingForPayment),
            Self::Rejected | Self::Cancelled => Some(Self::WaitingForAdminConfirmation),
            Self::WaitingForPayment | Self::WaitingForAdminConfirmation | Self::Done => None,
        }
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitingForPayment => write!(f, "WaitingForPayment"),
            Self::WaitingForAdminConfirmation => write!(f, "WaitingForAdminConfirmation"),
            Self::Done => write!(f, "Done"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Expired => write!(f, "Expired"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid transaction status: {0}")]
pub struct ConversionError(String);

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WaitingForPayment" => Ok(Self::WaitingForPayment),
            "WaitingForAdminConfirmation" => Ok(Self::WaitingForAdminConfirmation),
            "Done" => Ok(Self::Done),
            "Rejected" => Ok(Self::Rejected),
            "Expired" => Ok(Self::Expired),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction status: {value}. But this conversion cannot fail. Defaulting to WaitingForPayment");
            TransactionStatus::WaitingForPayment
        })
    }
}

//--------------------------------- InventoryTarget --------------------------------------------------------------------
/// The authoritative seat pool for a purchase. When a transaction names a ticket type, that type
/// — not its parent event — owns the inventory, so reservation and release always address the
/// same counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryTarget {
    Event(i64),
    TicketType(i64),
}

impl InventoryTarget {
    pub fn new(event_id: i64, ticket_type_id: Option<i64>) -> Self {
        match ticket_type_id {
            Some(id) => Self::TicketType(id),
            None => Self::Event(event_id),
        }
    }
}

impl Display for InventoryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event(id) => write!(f, "event #{id}"),
            Self::TicketType(id) => write!(f, "ticket type #{id}"),
        }
    }
}

//--------------------------------- Event ------------------------------------------------------------------------------
/// A catalog event row. Catalog CRUD lives outside the engine; the engine only reads price and
/// publication state, and mutates `remaining_seats` through conditional updates.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub organizer_id: i64,
    pub name: String,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub price: Money,
    pub total_seats: i64,
    pub remaining_seats: i64,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub organizer_id: i64,
    pub name: String,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub price: Money,
    pub total_seats: i64,
    pub is_published: bool,
}

impl NewEvent {
    pub fn new<S: Into<String>>(organizer_id: i64, name: S, price: Money, total_seats: i64) -> Self {
        Self {
            organizer_id,
            name: name.into(),
            location: None,
            starts_at: None,
            price,
            total_seats,
            is_published: true,
        }
    }

    pub fn unpublished(mut self) -> Self {
        self.is_published = false;
        self
    }
}

//--------------------------------- TicketType -------------------------------------------------------------------------
/// Optional sub-inventory of an event with its own price and seat pool.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TicketType {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub price: Money,
    pub total_seats: i64,
    pub remaining_seats: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTicketType {
    pub event_id: i64,
    pub name: String,
    pub price: Money,
    pub total_seats: i64,
}

impl NewTicketType {
    pub fn new<S: Into<String>>(event_id: i64, name: S, price: Money, total_seats: i64) -> Self {
        Self { event_id, name: name.into(), price, total_seats }
    }
}

//--------------------------------- Voucher ----------------------------------------------------------------------------
/// Event-scoped, multi-use (optionally capped) discount code with an activity window.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Voucher {
    pub id: i64,
    pub event_id: i64,
    pub code: String,
    pub discount_amount: Money,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Voucher {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.map(|max| self.used_count >= max).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct NewVoucher {
    pub event_id: i64,
    pub code: String,
    pub discount_amount: Money,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_uses: Option<i64>,
}

impl NewVoucher {
    pub fn new<S: Into<String>>(
        event_id: i64,
        code: S,
        discount_amount: Money,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Self {
        Self { event_id, code: code.into(), discount_amount, starts_at, ends_at, max_uses: None }
    }

    pub fn with_max_uses(mut self, max_uses: i64) -> Self {
        self.max_uses = Some(max_uses);
        self
    }
}

//--------------------------------- Coupon -----------------------------------------------------------------------------
/// User-scoped, single-use discount code. `used_at` doubles as the availability flag: a coupon
/// backs at most one live transaction, and rollback clears the field to free it again.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    pub discount_amount: Money,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub user_id: i64,
    pub code: String,
    pub discount_amount: Money,
    pub expires_at: DateTime<Utc>,
}

impl NewCoupon {
    pub fn new<S: Into<String>>(user_id: i64, code: S, discount_amount: Money, expires_at: DateTime<Utc>) -> Self {
        Self { user_id, code: code.into(), discount_amount, expires_at }
    }
}

//--------------------------------- LedgerEntry ------------------------------------------------------------------------
/// An append-only point-ledger row. Negative amounts are debits, positive amounts are credits.
/// A user's balance is the sum of entries that have not expired; nothing ever edits or deletes an
/// entry, so a refund is a fresh compensating credit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub amount: Money,
    pub reason: Option<String>,
    pub transaction_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub amount: Money,
    pub reason: Option<String>,
    pub transaction_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewLedgerEntry {
    /// A plain point grant, as issued by the (external) loyalty layer.
    pub fn grant(user_id: i64, amount: Money, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { user_id, amount, reason: None, transaction_id: None, expires_at }
    }

    /// The debit recorded when points are spent on a transaction.
    pub fn spend(user_id: i64, amount: Money) -> Self {
        Self {
            user_id,
            amount: -amount,
            reason: Some(LEDGER_REASON_SPEND.to_string()),
            transaction_id: None,
            expires_at: None,
        }
    }

    /// The compensating credit appended by a rollback. The credit expires like an ordinary grant
    /// so refunded points do not live forever.
    pub fn rollback_credit(user_id: i64, amount: Money, transaction_id: i64, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            amount,
            reason: Some(LEDGER_REASON_ROLLBACK.to_string()),
            transaction_id: Some(transaction_id),
            expires_at: Some(expires_at),
        }
    }
}

//--------------------------------- Transaction ------------------------------------------------------------------------
/// The aggregate root of the purchase lifecycle. Amounts are frozen at creation time: later price
/// edits on the event never change `subtotal_amount`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
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
    pub payment_proof_url: Option<String>,
    pub payment_proof_uploaded_at: Option<DateTime<Utc>>,
    pub decision_due_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_free(&self) -> bool {
        self.total_amount.is_zero()
    }

    pub fn has_proof(&self) -> bool {
        self.payment_proof_url.is_some()
    }

    pub fn inventory_target(&self) -> InventoryTarget {
        InventoryTarget::new(self.event_id, self.ticket_type_id)
    }
}

//--------------------------------- NewTransaction ---------------------------------------------------------------------
/// A customer's creation request. Voucher and coupon are referenced by code — resolution and
/// redemption happen inside the atomic creation unit, not before it.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub customer_id: i64,
    pub event_id: i64,
    pub ticket_type_id: Option<i64>,
    pub qty: i64,
    pub voucher_code: Option<String>,
    pub coupon_code: Option<String>,
    pub requested_points: Money,
}

impl NewTransaction {
    pub fn new(customer_id: i64, event_id: i64, qty: i64) -> Self {
        Self {
            customer_id,
            event_id,
            ticket_type_id: None,
            qty,
            voucher_code: None,
            coupon_code: None,
            requested_points: Money::zero(),
        }
    }

    pub fn with_ticket_type(mut self, ticket_type_id: i64) -> Self {
        self.ticket_type_id = Some(ticket_type_id);
        self
    }

    pub fn with_voucher_code<S: Into<String>>(mut self, code: S) -> Self {
        self.voucher_code = Some(code.into());
        self
    }

    pub fn with_coupon_code<S: Into<String>>(mut self, code: S) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn with_points(mut self, points: Money) -> Self {
        self.requested_points = points;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            TransactionStatus::WaitingForPayment,
            TransactionStatus::WaitingForAdminConfirmation,
            TransactionStatus::Done,
            TransactionStatus::Rejected,
            TransactionStatus::Expired,
            TransactionStatus::Cancelled,
        ] {
            let parsed: TransactionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("NotAStatus".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TransactionStatus::WaitingForPayment.is_terminal());
        assert!(!TransactionStatus::WaitingForAdminConfirmation.is_terminal());
        assert!(TransactionStatus::Done.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
        assert!(TransactionStatus::Expired.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn compensation_sources_match_the_state_machine() {
        use TransactionStatus::*;
        assert_eq!(Expired.compensation_source(), Some(WaitingForPayment));
        assert_eq!(Rejected.compensation_source(), Some(WaitingForAdminConfirmation));
        assert_eq!(Cancelled.compensation_source(), Some(WaitingForAdminConfirmation));
        assert_eq!(Done.compensation_source(), None);
    }

    #[test]
    fn inventory_target_prefers_the_ticket_type() {
        assert_eq!(InventoryTarget::new(7, None), InventoryTarget::Event(7));
        assert_eq!(InventoryTarget::new(7, Some(3)), InventoryTarget::TicketType(3));
    }

    #[test]
    fn voucher_window_is_inclusive() {
        let now = Utc::now();
        let voucher = Voucher {
            id: 1,
            event_id: 1,
            code: "LAUNCH".to_string(),
            discount_amount: Money::from(10_000),
            starts_at: now,
            ends_at: now,
            max_uses: Some(2),
            used_count: 2,
            created_at: now,
            updated_at: now,
        };
        assert!(voucher.is_active_at(now));
        assert!(!voucher.is_active_at(now + chrono::Duration::seconds(1)));
        assert!(voucher.is_exhausted());
    }
}
