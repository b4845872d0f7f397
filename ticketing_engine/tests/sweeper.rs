//! Deadline enforcement and rollback idempotence: overdue transactions are compensated exactly
//! once, repeat ticks are no-ops, and freed coupons are reusable.
use std::time::Duration as StdDuration;

use chrono::Duration;
use ticketing_engine::{
    db_types::{NewTransaction, TransactionStatus},
    events::EventProducers,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed,
    },
    CompensationOutcome,
    SqliteDatabase,
    Sweeper,
    TicketingDatabase,
    TransactionFlowApi,
    DECISION_WINDOW,
    PAYMENT_WINDOW,
};
use tix_common::Money;

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

/// An API whose payment window is already in the past: transactions are born overdue.
fn overdue_payment_api(db: &SqliteDatabase) -> TransactionFlowApi<SqliteDatabase> {
    TransactionFlowApi::new(db.clone(), EventProducers::default()).with_windows(Duration::hours(-1), DECISION_WINDOW)
}

/// An API whose decision window is already in the past: proof uploads are born overdue.
fn overdue_decision_api(db: &SqliteDatabase) -> TransactionFlowApi<SqliteDatabase> {
    TransactionFlowApi::new(db.clone(), EventProducers::default()).with_windows(PAYMENT_WINDOW, Duration::hours(-1))
}

#[tokio::test]
async fn overdue_payments_expire_and_release_their_seats() {
    let db = new_db().await;
    let event = seed::seed_event(&db, 10, 50_000, 10).await;
    let api = overdue_payment_api(&db);
    let trx = api.create_transaction(NewTransaction::new(1, event.id, 4)).await.expect("Error creating transaction");
    assert_eq!(seed::fetch_event(&db, event.id).await.remaining_seats, 6);

    let sweeper = Sweeper::new(db.clone(), EventProducers::default());
    let result = sweeper.tick().await.expect("Error running sweep");
    assert_eq!(result.expired, vec![trx.id]);
    assert_eq!(result.cancelled_count(), 0);
    assert_eq!(result.failed, 0);

    let expired = db.fetch_transaction(trx.id).await.expect("Error fetching").expect("Transaction should exist");
    assert_eq!(expired.status, TransactionStatus::Expired);
    assert!(expired.decided_at.is_some());
    assert!(expired.decision_due_at.is_none());
    assert_eq!(seed::fetch_event(&db, event.id).await.remaining_seats, 10);

    // A second tick finds nothing: the terminal row no longer matches the overdue scan.
    let again = sweeper.tick().await.expect("Error running sweep");
    assert!(again.is_empty());
    assert_eq!(seed::fetch_event(&db, event.id).await.remaining_seats, 10);
}

#[tokio::test]
async fn overdue_decisions_cancel_with_a_full_refund() {
    let db = new_db().await;
    let event = seed::seed_event(&db, 10, 100_000, 5).await;
    seed::seed_coupon(&db, 1, "REFUNDME", 15_000).await;
    seed::grant_points(&db, 1, 30_000).await;
    let api = overdue_decision_api(&db);

    let order =
        NewTransaction::new(1, event.id, 1).with_coupon_code("REFUNDME").with_points(Money::from(30_000));
    let trx = api.create_transaction(order).await.expect("Error creating transaction");
    api.upload_payment_proof(trx.id, 1, "https://files.example.com/proof.png").await.expect("Error uploading proof");

    let sweeper = Sweeper::new(db.clone(), EventProducers::default());
    let result = sweeper.tick().await.expect("Error running sweep");
    assert_eq!(result.cancelled, vec![trx.id]);
    assert_eq!(result.expired_count(), 0);

    let cancelled = db.fetch_transaction(trx.id).await.expect("Error fetching").expect("Transaction should exist");
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
    assert!(cancelled.coupon_id.is_none());
    assert_eq!(cancelled.points_used, Money::zero());
    assert_eq!(seed::fetch_event(&db, event.id).await.remaining_seats, 5);
    assert!(!seed::fetch_coupon(&db, "REFUNDME").await.is_used());
    assert_eq!(db.points_balance(1, chrono::Utc::now()).await.expect("Error fetching balance"), Money::from(30_000));
}

#[tokio::test]
async fn compensation_applies_exactly_once() {
    let db = new_db().await;
    let event = seed::seed_event(&db, 10, 50_000, 8).await;
    seed::grant_points(&db, 1, 10_000).await;
    let api = overdue_payment_api(&db);
    let order = NewTransaction::new(1, event.id, 2).with_points(Money::from(10_000));
    let trx = api.create_transaction(order).await.expect("Error creating transaction");

    let now = chrono::Utc::now();
    let first = db
        .compensate_transaction(trx.id, TransactionStatus::Expired, now)
        .await
        .expect("Error compensating transaction");
    assert!(first.was_applied());

    let second = db
        .compensate_transaction(trx.id, TransactionStatus::Expired, now)
        .await
        .expect("Error compensating transaction");
    assert!(matches!(second, CompensationOutcome::AlreadySettled));

    // One release, one credit — not two of either.
    assert_eq!(seed::fetch_event(&db, event.id).await.remaining_seats, 8);
    let credits: Vec<_> = seed::ledger_for(&db, 1)
        .await
        .into_iter()
        .filter(|entry| entry.transaction_id == Some(trx.id))
        .collect();
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].amount, Money::from(10_000));
    assert_eq!(db.points_balance(1, now).await.expect("Error fetching balance"), Money::from(10_000));
}

#[tokio::test]
async fn a_freed_coupon_can_back_a_new_transaction() {
    let db = new_db().await;
    let event = seed::seed_event(&db, 10, 50_000, 5).await;
    seed::seed_coupon(&db, 1, "AGAIN", 5_000).await;

    let overdue = overdue_payment_api(&db);
    let first =
        overdue.create_transaction(NewTransaction::new(1, event.id, 1).with_coupon_code("AGAIN")).await.expect("Error creating transaction");

    let sweeper = Sweeper::new(db.clone(), EventProducers::default());
    let result = sweeper.tick().await.expect("Error running sweep");
    assert_eq!(result.expired, vec![first.id]);

    // The coupon came back; the unique linkage on the old row is gone, so a fresh transaction
    // can claim it.
    let api = TransactionFlowApi::new(db.clone(), EventProducers::default());
    let second = api
        .create_transaction(NewTransaction::new(1, event.id, 1).with_coupon_code("AGAIN"))
        .await
        .expect("Error re-using coupon");
    assert_eq!(second.coupon_discount, Money::from(5_000));
    assert!(seed::fetch_coupon(&db, "AGAIN").await.is_used());
}

#[tokio::test]
async fn live_transactions_are_left_alone() {
    let db = new_db().await;
    let event = seed::seed_event(&db, 10, 50_000, 5).await;
    let api = TransactionFlowApi::new(db.clone(), EventProducers::default());
    let trx = api.create_transaction(NewTransaction::new(1, event.id, 1)).await.expect("Error creating transaction");

    let sweeper = Sweeper::new(db.clone(), EventProducers::default());
    let result = sweeper.tick().await.expect("Error running sweep");
    assert!(result.is_empty());

    let unchanged = db.fetch_transaction(trx.id).await.expect("Error fetching").expect("Transaction should exist");
    assert_eq!(unchanged.status, TransactionStatus::WaitingForPayment);
    assert_eq!(seed::fetch_event(&db, event.id).await.remaining_seats, 4);
}

#[tokio::test]
async fn the_sweep_loop_runs_and_shuts_down() {
    let db = new_db().await;
    let event = seed::seed_event(&db, 10, 50_000, 5).await;
    let api = overdue_payment_api(&db);
    let trx = api.create_transaction(NewTransaction::new(1, event.id, 1)).await.expect("Error creating transaction");

    let sweeper =
        Sweeper::new(db.clone(), EventProducers::default()).with_interval(StdDuration::from_millis(50));
    let shutdown = sweeper.shutdown_handle();
    let handle = sweeper.start();

    // Give the loop a couple of ticks to find the overdue row.
    tokio::time::sleep(StdDuration::from_millis(300)).await;
    let expired = db.fetch_transaction(trx.id).await.expect("Error fetching").expect("Transaction should exist");
    assert_eq!(expired.status, TransactionStatus::Expired);

    shutdown.shutdown();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("Sweeper did not shut down in time")
        .expect("Sweeper task panicked");
}
