mod common;

use assert_matches::assert_matches;
use common::{ctx, TestLedger};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stock_ledger::{
    entities::{ItemLocation, Location, RemovalReason, TransferDirection},
    services::{consumption::ConsumeStock, transfer::TransferRequest},
    ServiceError,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_consumers_cannot_oversell() {
    let app = TestLedger::new().await;
    let item = app.item("Rice", ItemLocation::Both).await;
    app.receive(item.id, Location::Store, dec!(10), dec!(45)).await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let ledger = app.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .consume(
                    ConsumeStock::new(item.id, Location::Store, dec!(7), RemovalReason::BoardingHouse),
                    ctx(),
                )
                .await
        }));
    }

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => successes += 1,
            Err(ServiceError::InsufficientStock(_)) => rejections += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(rejections, 1);
    assert_eq!(app.on_hand(item.id, Location::Store).await, dec!(3));
    app.assert_consistent(item.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_small_sales_drain_exactly_to_zero() {
    let app = TestLedger::new().await;
    let item = app.item("Buns", ItemLocation::Both).await;
    app.receive(item.id, Location::Shop, dec!(8), dec!(2)).await;
    app.receive(item.id, Location::Shop, dec!(7), dec!(3)).await;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let ledger = app.ledger.clone();
            tokio::spawn(async move {
                ledger
                    .consume(
                        ConsumeStock::new(item.id, Location::Shop, dec!(1), RemovalReason::Sale),
                        ctx(),
                    )
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        if handle.await.expect("task panicked").is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 15);
    assert_eq!(app.on_hand(item.id, Location::Shop).await, Decimal::ZERO);
    assert_eq!(
        app.remaining(item.id, Location::Shop).await,
        vec![Decimal::ZERO, Decimal::ZERO]
    );
    app.assert_consistent(item.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_multi_item_transfers_both_complete() {
    let app = TestLedger::new().await;
    let a = app.item("Pens", ItemLocation::Both).await;
    let b = app.item("Pads", ItemLocation::Both).await;
    for item in [&a, &b] {
        app.receive(item.id, Location::Store, dec!(10), dec!(1)).await;
        app.receive(item.id, Location::Shop, dec!(10), dec!(1)).await;
    }

    let outbound = {
        let ledger = app.ledger.clone();
        let lines = vec![(a.id, dec!(3)), (b.id, dec!(3))];
        tokio::spawn(async move {
            ledger
                .transfer(TransferRequest::new(TransferDirection::StoreToShop, lines), ctx())
                .await
        })
    };
    let inbound = {
        let ledger = app.ledger.clone();
        let lines = vec![(b.id, dec!(2)), (a.id, dec!(2))];
        tokio::spawn(async move {
            ledger
                .transfer(TransferRequest::new(TransferDirection::ShopToStore, lines), ctx())
                .await
        })
    };

    outbound.await.expect("task panicked").expect("outbound transfer");
    inbound.await.expect("task panicked").expect("inbound transfer");

    for item in [&a, &b] {
        assert_eq!(app.on_hand(item.id, Location::Store).await, dec!(9));
        assert_eq!(app.on_hand(item.id, Location::Shop).await, dec!(11));
        app.assert_consistent(item.id).await;
    }
}

#[tokio::test]
async fn held_item_lock_times_out_without_writing() {
    let app = TestLedger::with_lock_timeout(50).await;
    let item = app.item("Chalk", ItemLocation::Both).await;
    app.receive(item.id, Location::Shop, dec!(5), dec!(1)).await;
    let before = app.snapshot().await;

    let held = app.ledger.locks.acquire(item.id).await.expect("lock");
    let result = app
        .ledger
        .consume(
            ConsumeStock::new(item.id, Location::Shop, dec!(1), RemovalReason::Sale),
            ctx(),
        )
        .await;

    let err = result.unwrap_err();
    assert_matches!(err, ServiceError::ConcurrencyTimeout(_));
    assert!(err.is_retryable());
    assert_eq!(app.snapshot().await, before);

    drop(held);
    app.ledger
        .consume(
            ConsumeStock::new(item.id, Location::Shop, dec!(1), RemovalReason::Sale),
            ctx(),
        )
        .await
        .expect("consume after release");
    assert_eq!(app.on_hand(item.id, Location::Shop).await, dec!(4));
}
