use serde::{Deserialize, Serialize};

use crate::db_types::Transaction;

/// Outcome of a compensation attempt. `AlreadySettled` is the idempotency result: someone else —
/// a concurrent sweeper tick, an organizer decision, a repeated call — got there first, and no
/// side effects were applied.
#[derive(Debug, Clone)]
pub enum CompensationOutcome {
    Compensated(Transaction),
    AlreadySettled,
}

impl CompensationOutcome {
    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Compensated(_))
    }
}

/// The result of one sweeper tick: which transactions were expired, which were cancelled, and how
/// many rows hit a transient error and were left for the next tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepResult {
    pub expired: Vec<i64>,
    pub cancelled: Vec<i64>,
    pub failed: usize,
}

impl SweepResult {
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }

    pub fn total_count(&self) -> usize {
        self.expired_count() + self.cancelled_count()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0 && self.failed == 0
    }
}
