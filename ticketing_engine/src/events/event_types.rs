use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db_types::{Transaction, TransactionStatus};

/// Published after an organizer accepts a transaction. Consumers typically render the
/// "transaction accepted" mail template from [`Self::template_data`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionAcceptedEvent {
    pub transaction: Transaction,
    pub event_name: String,
}

impl TransactionAcceptedEvent {
    pub fn new(transaction: Transaction, event_name: String) -> Self {
        Self { transaction, event_name }
    }

    pub fn template_data(&self) -> serde_json::Value {
        json!({
            "transactionId": self.transaction.id,
            "eventName": self.event_name,
        })
    }
}

/// Published whenever a transaction is driven to a compensated terminal state — rejected by the
/// organizer, expired by the sweeper, or cancelled after the decision window lapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionAnnulledEvent {
    pub transaction: Transaction,
    pub status: TransactionStatus,
    pub event_name: String,
}

impl TransactionAnnulledEvent {
    pub fn new(transaction: Transaction, event_name: String) -> Self {
        let status = transaction.status;
        Self { transaction, status, event_name }
    }

    pub fn template_data(&self) -> serde_json::Value {
        json!({
            "transactionId": self.transaction.id,
            "eventName": self.event_name,
            "status": self.status.to_string(),
        })
    }
}
