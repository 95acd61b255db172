mod common;

use assert_matches::assert_matches;
use common::{ctx, day, TestLedger};
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stock_ledger::{
    entities::{BatchSource, ItemLocation, Location, RemovalReason},
    events::Event,
    services::{
        consumption::ConsumeStock,
        item_registry::NewItem,
        stock_in::{PurchaseOrderLine, PurchaseOrderReceipt, ReceiveStock},
    },
    ServiceError,
};

fn po_line(po_line_id: i64, item_id: i64, quantity: Decimal, unit_cost: Decimal) -> PurchaseOrderLine {
    PurchaseOrderLine {
        po_line_id,
        item_id,
        quantity,
        unit_cost,
        batch_number: None,
        expiry_date: None,
    }
}

#[tokio::test]
async fn receive_credits_registry_and_creates_batch() {
    let mut app = TestLedger::new().await;
    let item = app.item("Exercise book", ItemLocation::Both).await;

    let batch = app.receive(item.id, Location::Store, dec!(40), dec!(12)).await;

    assert_eq!(batch.quantity_received, dec!(40));
    assert_eq!(batch.quantity_remaining, dec!(40));
    assert_eq!(batch.unit_cost, dec!(12));
    assert_eq!(batch.source, BatchSource::Purchase);
    assert_eq!(app.on_hand(item.id, Location::Store).await, dec!(40));
    assert_eq!(app.on_hand(item.id, Location::Shop).await, Decimal::ZERO);
    app.assert_consistent(item.id).await;

    let events = app.drain_events();
    assert_matches!(
        events.as_slice(),
        [Event::StockReceived { batch_id, receipt_number, .. }]
            if *batch_id == batch.id && receipt_number.starts_with("STK-IN-")
    );
}

#[tokio::test]
async fn receive_at_ineligible_location_writes_nothing() {
    let app = TestLedger::new().await;
    let item = app.item("Uniform", ItemLocation::ShopOnly).await;
    let before = app.snapshot().await;

    let result = app
        .ledger
        .receive(
            ReceiveStock::new(item.id, Location::Store, dec!(5), dec!(30), BatchSource::Purchase),
            ctx(),
        )
        .await;

    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
    assert_eq!(app.snapshot().await, before);
}

#[rstest]
#[case(dec!(0))]
#[case(dec!(-3))]
#[tokio::test]
async fn receive_rejects_non_positive_quantity(#[case] quantity: Decimal) {
    let app = TestLedger::new().await;
    let item = app.item("Pencil", ItemLocation::Both).await;

    let result = app
        .ledger
        .receive(
            ReceiveStock::new(item.id, Location::Shop, quantity, dec!(1), BatchSource::Purchase),
            ctx(),
        )
        .await;

    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
    assert!(app.batches(item.id, Location::Shop).await.is_empty());
}

#[rstest]
#[case(dec!(0.125), dec!(3))]
#[case(dec!(2), dec!(3.333))]
#[tokio::test]
async fn receive_rejects_more_than_two_decimal_places(
    #[case] quantity: Decimal,
    #[case] unit_cost: Decimal,
) {
    let app = TestLedger::new().await;
    let item = app.item("Pencil", ItemLocation::Both).await;
    let before = app.snapshot().await;

    let result = app
        .ledger
        .receive(
            ReceiveStock::new(item.id, Location::Shop, quantity, unit_cost, BatchSource::Purchase),
            ctx(),
        )
        .await;

    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
    assert_eq!(app.snapshot().await, before);
}

#[tokio::test]
async fn opening_stock_rejects_sub_cent_quantity() {
    let app = TestLedger::new().await;
    let item = app.item("Soap", ItemLocation::Both).await;

    let result = app
        .ledger
        .record_opening_stock(item.id, Location::Shop, dec!(1.001), ctx())
        .await;

    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
    assert!(app.batches(item.id, Location::Shop).await.is_empty());
}

#[tokio::test]
async fn receive_for_unknown_item_is_not_found() {
    let app = TestLedger::new().await;

    let result = app
        .ledger
        .receive(
            ReceiveStock::new(999, Location::Shop, dec!(1), dec!(1), BatchSource::Purchase),
            ctx(),
        )
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn create_item_rejects_blank_name() {
    let app = TestLedger::new().await;

    let result = app
        .ledger
        .create_item(NewItem::new("", ItemLocation::Both, dec!(5)))
        .await;

    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn purchase_order_lines_share_one_receipt() {
    let app = TestLedger::new().await;
    let rice = app.item("Rice", ItemLocation::StoreOnly).await;
    let beans = app.item("Beans", ItemLocation::Both).await;

    let batches = app
        .ledger
        .receive_purchase_order(
            PurchaseOrderReceipt {
                purchase_order_id: 77,
                supplier_id: Some(3),
                location: Location::Store,
                received_date: Some(day(2024, 5, 2)),
                notes: None,
                lines: vec![
                    po_line(1, rice.id, dec!(10), dec!(45)),
                    po_line(2, beans.id, dec!(6), dec!(30)),
                ],
            },
            ctx(),
        )
        .await
        .expect("receive purchase order");

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].receipt_id, batches[1].receipt_id);
    assert_eq!(batches[0].po_line_id, Some(1));
    assert_eq!(batches[1].po_line_id, Some(2));
    assert!(batches.iter().all(|b| b.received_date == day(2024, 5, 2)));
    assert_eq!(app.on_hand(rice.id, Location::Store).await, dec!(10));
    assert_eq!(app.on_hand(beans.id, Location::Store).await, dec!(6));
    assert_eq!(app.snapshot().await.receipts, 1);
}

#[tokio::test]
async fn purchase_order_with_one_bad_line_rolls_back() {
    let app = TestLedger::new().await;
    let rice = app.item("Rice", ItemLocation::StoreOnly).await;
    let sweets = app.item("Sweets", ItemLocation::ShopOnly).await;
    let before = app.snapshot().await;

    let result = app
        .ledger
        .receive_purchase_order(
            PurchaseOrderReceipt {
                purchase_order_id: 78,
                supplier_id: None,
                location: Location::Store,
                received_date: None,
                notes: None,
                lines: vec![
                    po_line(1, rice.id, dec!(10), dec!(45)),
                    po_line(2, sweets.id, dec!(6), dec!(2)),
                ],
            },
            ctx(),
        )
        .await;

    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
    assert_eq!(app.snapshot().await, before);
}

#[tokio::test]
async fn opening_stock_prices_at_selling_price_then_last_cost() {
    let app = TestLedger::new().await;
    let item = app.item("Soap", ItemLocation::Both).await;

    let first = app
        .ledger
        .record_opening_stock(item.id, Location::Shop, dec!(4), ctx())
        .await
        .expect("opening stock");
    assert_eq!(first.unit_cost, item.selling_price);
    assert_eq!(first.source, BatchSource::Adjustment);

    app.receive(item.id, Location::Store, dec!(10), dec!(60)).await;
    let second = app
        .ledger
        .record_opening_stock(item.id, Location::Store, dec!(2), ctx())
        .await
        .expect("opening stock");

    assert_eq!(second.unit_cost, dec!(60));
    assert_eq!(app.on_hand(item.id, Location::Store).await, dec!(12));
    app.assert_consistent(item.id).await;
}

#[tokio::test]
async fn last_cost_price_prefers_latest_received_date() {
    let app = TestLedger::new().await;
    let item = app.item("Chalk", ItemLocation::Both).await;
    assert_eq!(app.ledger.last_cost_price(item.id).await.unwrap(), Decimal::ZERO);

    app.receive_on(item.id, Location::Store, dec!(10), dec!(5), day(2024, 2, 1))
        .await;
    // backdated receipt inserted later
    app.receive_on(item.id, Location::Store, dec!(10), dec!(7), day(2024, 1, 1))
        .await;
    assert_eq!(app.ledger.last_cost_price(item.id).await.unwrap(), dec!(5));

    // same date: the later insert wins
    app.receive_on(item.id, Location::Shop, dec!(1), dec!(9), day(2024, 2, 1))
        .await;
    assert_eq!(app.ledger.last_cost_price(item.id).await.unwrap(), dec!(9));
}

#[tokio::test]
async fn reversing_untouched_batch_restores_registry() {
    let mut app = TestLedger::new().await;
    let item = app.item("Ruler", ItemLocation::Both).await;
    app.receive(item.id, Location::Shop, dec!(5), dec!(3)).await;
    let mistake = app.receive(item.id, Location::Shop, dec!(50), dec!(3)).await;
    app.drain_events();

    let reversed = app
        .ledger
        .reverse_batch(mistake.id, ctx())
        .await
        .expect("reverse batch");

    assert_eq!(reversed.id, mistake.id);
    assert_eq!(app.on_hand(item.id, Location::Shop).await, dec!(5));
    assert_eq!(app.batches(item.id, Location::Shop).await.len(), 1);
    // the emptied receipt goes with it
    assert_eq!(app.snapshot().await.receipts, 1);
    app.assert_consistent(item.id).await;
    assert_matches!(
        app.drain_events().as_slice(),
        [Event::BatchReversed { batch_id, .. }] if *batch_id == mistake.id
    );
}

#[tokio::test]
async fn reversing_consumed_batch_is_rejected() {
    let app = TestLedger::new().await;
    let item = app.item("Ruler", ItemLocation::Both).await;
    let batch = app.receive(item.id, Location::Shop, dec!(5), dec!(3)).await;
    app.ledger
        .consume(
            ConsumeStock::new(item.id, Location::Shop, dec!(1), RemovalReason::Sale),
            ctx(),
        )
        .await
        .expect("consume");
    let before = app.snapshot().await;

    let result = app.ledger.reverse_batch(batch.id, ctx()).await;

    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
    assert_eq!(app.snapshot().await, before);
}

#[tokio::test]
async fn low_stock_lists_items_at_or_below_reorder_level() {
    let app = TestLedger::new().await;
    let low = app.item("Ink", ItemLocation::Both).await;
    let plenty = app.item("Paper", ItemLocation::Both).await;
    app.receive(low.id, Location::Shop, dec!(4), dec!(2)).await;
    app.receive(plenty.id, Location::Store, dec!(50), dec!(2)).await;

    let ids: Vec<i64> = app
        .ledger
        .low_stock()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();

    assert_eq!(ids, vec![low.id]);
}
