use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use tokio::{sync::Notify, task::JoinHandle};

use crate::{
    db_types::{Transaction, TransactionStatus},
    events::{EventProducers, TransactionAnnulledEvent},
    traits::{CompensationOutcome, SweepResult, TicketingDatabase, TicketingError},
};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// The deadline enforcer. Deadlines are passive data on the transaction rows; nothing fires per
/// transaction. Instead the sweeper scans on an interval and drives every overdue row to its
/// terminal state through the same rollback engine the foreground API uses, so compensation is
/// identical no matter which side gets there first.
///
/// The sweeper is an ordinary object with an owned lifecycle: construct it with a database
/// handle, [`start`](Self::start) the loop, stop it through a [`SweeperShutdown`] handle. Tests
/// skip the loop entirely and call [`tick_at`](Self::tick_at) with a chosen clock.
pub struct Sweeper<B> {
    db: B,
    producers: EventProducers,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl<B> Sweeper<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, interval: DEFAULT_SWEEP_INTERVAL, shutdown: Arc::new(Notify::new()) }
    }

    /// The sweep interval is a tuning parameter, not a correctness one: a slower sweeper only
    /// delays expiry, it never mis-expires.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// A handle that stops the loop started by [`start`](Self::start). Grab it before starting.
    pub fn shutdown_handle(&self) -> SweeperShutdown {
        SweeperShutdown(Arc::clone(&self.shutdown))
    }
}

impl<B> Sweeper<B>
where B: TicketingDatabase + Send + Sync + 'static
{
    /// Spawns the sweep loop. Do not await the returned handle except when shutting down.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            info!("🕰️ Deadline sweeper started, ticking every {:?}", self.interval);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        match self.tick().await {
                            Ok(result) if result.is_empty() => {
                                trace!("🕰️ Sweep tick: nothing overdue");
                            },
                            Ok(result) => {
                                info!(
                                    "🕰️ Sweep tick: {} expired, {} cancelled, {} failed",
                                    result.expired_count(),
                                    result.cancelled_count(),
                                    result.failed
                                );
                            },
                            Err(e) => {
                                error!("🕰️ Sweep tick failed, will retry next tick: {e}");
                            },
                        }
                    },
                    _ = self.shutdown.notified() => {
                        info!("🕰️ Deadline sweeper shutting down");
                        break;
                    },
                }
            }
        })
    }

    /// One sweep against the real clock.
    pub async fn tick(&self) -> Result<SweepResult, TicketingError> {
        self.tick_at(Utc::now()).await
    }

    /// One sweep against the given clock. Every overdue row is compensated independently: a row
    /// that fails is counted, logged and retried on the next tick, never silently dropped and
    /// never allowed to abort the rest of the batch.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<SweepResult, TicketingError> {
        let mut result = SweepResult::default();

        for id in self.db.overdue_payment_ids(now).await? {
            match self.db.compensate_transaction(id, TransactionStatus::Expired, now).await {
                Ok(CompensationOutcome::Compensated(expired)) => {
                    debug!("🕰️ Transaction #{id} expired: no payment proof before {}", expired.payment_due_at);
                    self.call_annulled_hook(&expired).await;
                    result.expired.push(id);
                },
                Ok(CompensationOutcome::AlreadySettled) => {
                    // The row moved on between the scan and the claim. Its new owner wins.
                    debug!("🕰️ Transaction #{id} was settled before the sweeper reached it");
                },
                Err(e) => {
                    error!("🕰️ Could not expire transaction #{id}, will retry next tick: {e}");
                    result.failed += 1;
                },
            }
        }

        for id in self.db.overdue_decision_ids(now).await? {
            match self.db.compensate_transaction(id, TransactionStatus::Cancelled, now).await {
                Ok(CompensationOutcome::Compensated(cancelled)) => {
                    debug!("🕰️ Transaction #{id} cancelled: no organizer decision in time");
                    self.call_annulled_hook(&cancelled).await;
                    result.cancelled.push(id);
                },
                Ok(CompensationOutcome::AlreadySettled) => {
                    debug!("🕰️ Transaction #{id} was settled before the sweeper reached it");
                },
                Err(e) => {
                    error!("🕰️ Could not cancel transaction #{id}, will retry next tick: {e}");
                    result.failed += 1;
                },
            }
        }

        Ok(result)
    }

    async fn call_annulled_hook(&self, transaction: &Transaction) {
        if self.producers.transaction_annulled_producer.is_empty() {
            return;
        }
        let event_name = match self.db.fetch_event(transaction.event_id).await {
            Ok(Some(event)) => event.name,
            Ok(None) => String::new(),
            Err(e) => {
                warn!("🕰️📬️ Could not fetch event {} for notification: {e}", transaction.event_id);
                String::new()
            },
        };
        for emitter in &self.producers.transaction_annulled_producer {
            let event = TransactionAnnulledEvent::new(transaction.clone(), event_name.clone());
            emitter.publish_event(event).await;
        }
    }
}

/// Stops a running sweeper. Cheap to clone around shutdown plumbing.
#[derive(Clone)]
pub struct SweeperShutdown(Arc<Notify>);

impl SweeperShutdown {
    pub fn shutdown(&self) {
        self.0.notify_one();
    }
}
