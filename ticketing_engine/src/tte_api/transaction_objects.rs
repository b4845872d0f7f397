use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tix_common::Money;

use crate::db_types::TransactionStatus;

/// Search criteria for transactions. Empty filters match everything the caller is scoped to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionQueryFilter {
    pub customer_id: Option<i64>,
    pub event_id: Option<i64>,
    pub status: Option<Vec<TransactionStatus>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TransactionQueryFilter {
    pub fn with_customer_id(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_event_id(mut self, event_id: i64) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() &&
            self.event_id.is_none() &&
            self.status.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for TransactionQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(customer_id) = &self.customer_id {
            write!(f, "customer_id: {customer_id}. ")?;
        }
        if let Some(event_id) = &self.event_id {
            write!(f, "event_id: {event_id}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        Ok(())
    }
}

/// A customer-facing view of one purchase: enough to render a "my tickets" list without exposing
/// organizer-side detail.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CustomerTransaction {
    pub id: i64,
    pub status: TransactionStatus,
    pub qty: i64,
    pub total_amount: Money,
    pub payment_due_at: DateTime<Utc>,
    pub decision_due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub event_id: i64,
    pub event_name: String,
    pub event_starts_at: Option<DateTime<Utc>>,
    pub event_location: Option<String>,
}

/// The organizer-facing view: the full amount breakdown plus the proof link, for reviewing
/// incoming payments across their events.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrganizerTransaction {
    pub id: i64,
    pub customer_id: i64,
    pub status: TransactionStatus,
    pub qty: i64,
    pub subtotal_amount: Money,
    pub voucher_discount: Money,
    pub coupon_discount: Money,
    pub points_used: Money,
    pub total_amount: Money,
    pub payment_proof_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub event_id: i64,
    pub event_name: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_builder_accumulates_statuses() {
        let filter = TransactionQueryFilter::default()
            .with_event_id(3)
            .with_status(TransactionStatus::WaitingForPayment)
            .with_status(TransactionStatus::Done);
        assert_eq!(filter.event_id, Some(3));
        assert_eq!(filter.status.as_ref().map(|s| s.len()), Some(2));
        assert!(!filter.is_empty());
    }

    #[test]
    fn empty_filter_displays_as_such() {
        assert_eq!(TransactionQueryFilter::default().to_string(), "No filters.");
    }
}
