//! Races on shared counters: the last seat and the capped voucher. The engine's conditional
//! writes must admit exactly as many winners as there is inventory, no matter how the attempts
//! interleave.
use ticketing_engine::{
    db_types::NewTransaction,
    events::EventProducers,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed,
    },
    SqliteDatabase,
    TicketingError,
    TransactionFlowApi,
};

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

#[tokio::test(flavor = "multi_thread")]
async fn the_last_seat_goes_to_exactly_one_buyer() {
    let db = new_db().await;
    let event = seed::seed_event(&db, 10, 50_000, 1).await;

    let mut handles = Vec::new();
    for customer_id in 1..=2 {
        let api = TransactionFlowApi::new(db.clone(), EventProducers::default());
        let event_id = event.id;
        handles.push(tokio::spawn(async move {
            api.create_transaction(NewTransaction::new(customer_id, event_id, 1)).await
        }));
    }
    let mut successes = 0;
    for handle in handles {
        match handle.await.expect("Task panicked") {
            Ok(_) => successes += 1,
            Err(TicketingError::InsufficientInventory { .. }) => {},
            Err(e) => panic!("Unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(seed::fetch_event(&db, event.id).await.remaining_seats, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn an_oversubscribed_event_sells_exactly_its_capacity() {
    let db = new_db().await;
    let event = seed::seed_event(&db, 10, 50_000, 3).await;

    let mut handles = Vec::new();
    for customer_id in 1..=6 {
        let api = TransactionFlowApi::new(db.clone(), EventProducers::default());
        let event_id = event.id;
        handles.push(tokio::spawn(async move {
            api.create_transaction(NewTransaction::new(customer_id, event_id, 1)).await
        }));
    }
    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("Task panicked") {
            Ok(_) => successes += 1,
            Err(TicketingError::InsufficientInventory { .. }) => conflicts += 1,
            Err(e) => panic!("Unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 3);
    assert_eq!(conflicts, 3);
    assert_eq!(seed::fetch_event(&db, event.id).await.remaining_seats, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_capped_voucher_admits_exactly_max_uses_redemptions() {
    let db = new_db().await;
    let event = seed::seed_event(&db, 10, 50_000, 10).await;
    seed::seed_voucher(&db, event.id, "CAPPED", 10_000, Some(3)).await;

    let mut handles = Vec::new();
    for customer_id in 1..=6 {
        let api = TransactionFlowApi::new(db.clone(), EventProducers::default());
        let event_id = event.id;
        handles.push(tokio::spawn(async move {
            let order = NewTransaction::new(customer_id, event_id, 1).with_voucher_code("CAPPED");
            api.create_transaction(order).await
        }));
    }
    let mut successes = 0;
    for handle in handles {
        match handle.await.expect("Task panicked") {
            Ok(trx) => {
                successes += 1;
                assert_eq!(trx.voucher_discount, tix_common::Money::from(10_000));
            },
            Err(TicketingError::InvalidVoucher(_)) => {},
            Err(e) => panic!("Unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 3);
    assert_eq!(seed::fetch_voucher(&db, "CAPPED").await.used_count, 3);
    // The three losing attempts rolled their seat reservations back with the failure.
    assert_eq!(seed::fetch_event(&db, event.id).await.remaining_seats, 7);
}
