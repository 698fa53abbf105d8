//! End-to-end ledger scenarios against an in-memory SQLite database, with a
//! recording publisher standing in for the broker link.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Mutex;

use positron::client::EventPublisher;
use positron::ledger::{self, Operation, PositionLedger};
use positron::topics::Topic;

// ─── Recording Publisher ──────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<(Topic, Value)>>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: Topic, payload: Value) {
        self.events.lock().await.push((topic, payload));
    }
}

impl RecordingPublisher {
    async fn take(&self) -> Vec<(Topic, Value)> {
        std::mem::take(&mut *self.events.lock().await)
    }

    async fn take_one(&self) -> (Topic, Value) {
        let mut events = self.take().await;
        assert_eq!(events.len(), 1, "expected exactly one response: {events:?}");
        events.pop().unwrap()
    }
}

// ─── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    ledger: Arc<PositionLedger>,
    publisher: Arc<RecordingPublisher>,
    pool: sqlx::SqlitePool,
}

async fn harness() -> Harness {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    ledger::schema::initialize(&pool).await.unwrap();

    let publisher = Arc::new(RecordingPublisher::default());
    let ledger = PositionLedger::new(pool.clone(), publisher.clone());
    Harness { ledger, publisher, pool }
}

fn position_payload(id: &str, pool_name: &str, timestamp: &str) -> Value {
    json!({
        "id": id,
        "purchase_price": 100.0,
        "number_of_tokens": 5.0,
        "expected_sale_price": 110.0,
        "next_purchase_price": 95.0,
        "variations": "[]",
        "timestamp": timestamp,
        "pair": "BTC/USDT",
        "pool_name": pool_name
    })
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_add_then_sell_round_trip() {
    let h = harness().await;

    h.ledger
        .add_position(position_payload("P1", "main", "2026-01-01T00:00:00+00:00"))
        .await
        .unwrap();
    let (topic, payload) = h.publisher.take_one().await;
    assert_eq!(topic, Topic::PositionOpened);
    assert_eq!(payload["id"], "P1");
    assert_eq!(payload["status"], "open");

    h.ledger.opened_positions(Value::Null).await.unwrap();
    let (topic, payload) = h.publisher.take_one().await;
    assert_eq!(topic, Topic::OpenedPositionsRetrieved);
    assert_eq!(payload.as_array().unwrap().len(), 1);
    assert_eq!(payload[0]["id"], "P1");

    h.ledger.sell_position(json!("P1")).await.unwrap();
    let (topic, payload) = h.publisher.take_one().await;
    assert_eq!(topic, Topic::PositionSold);
    assert_eq!(payload, json!("P1"));

    h.ledger.opened_positions(Value::Null).await.unwrap();
    let (_, payload) = h.publisher.take_one().await;
    assert_eq!(payload, json!([]));

    h.ledger.all_positions_data(Value::Null).await.unwrap();
    let (topic, payload) = h.publisher.take_one().await;
    assert_eq!(topic, Topic::AllPositionsRetrieved);
    assert_eq!(payload.as_array().unwrap().len(), 1);
    assert_eq!(payload[0]["status"], "closed");

    // Audit trail: BUY then SELL, in that order.
    let events = ledger::store::events_for(&h.pool, "P1").await.unwrap();
    let kinds: Vec<Operation> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, vec![Operation::Buy, Operation::Sell]);
}

#[tokio::test]
async fn test_pool_filtering() {
    let h = harness().await;

    for (id, pool, ts) in [
        ("P1", "main", "2026-01-01T00:00:00+00:00"),
        ("P2", "alt", "2026-01-02T00:00:00+00:00"),
        ("P3", "alt", "2026-01-03T00:00:00+00:00"),
    ] {
        h.ledger.add_position(position_payload(id, pool, ts)).await.unwrap();
    }
    h.publisher.take().await;

    h.ledger.count_opened_positions(json!(["alt"])).await.unwrap();
    let (topic, payload) = h.publisher.take_one().await;
    assert_eq!(topic, Topic::OpenedPositionsCountRetrieved);
    assert_eq!(payload, json!(2));

    // No filter (and the empty filter) mean all pools.
    h.ledger.count_opened_positions(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!(3));
    h.ledger.count_opened_positions(json!([])).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!(3));

    h.ledger.opened_positions(json!(["alt"])).await.unwrap();
    let (_, payload) = h.publisher.take_one().await;
    let ids: Vec<&str> = payload
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    // Oldest first.
    assert_eq!(ids, vec!["P2", "P3"]);
}

#[tokio::test]
async fn test_last_purchase_price_and_max_sale_price() {
    let h = harness().await;

    // Empty ledger answers with the zero shape, not silence.
    h.ledger.last_purchase_price(Value::Null).await.unwrap();
    assert_eq!(
        h.publisher.take_one().await,
        (Topic::LastPurchasePriceRetrieved, json!(0.0))
    );
    h.ledger.max_sale_price(Value::Null).await.unwrap();
    assert_eq!(
        h.publisher.take_one().await,
        (Topic::MaxSalePriceRetrieved, json!(0.0))
    );

    h.ledger
        .add_position(position_payload("P1", "main", "2026-01-01T00:00:00+00:00"))
        .await
        .unwrap();
    let mut newer = position_payload("P2", "main", "2026-02-01T00:00:00+00:00");
    newer["purchase_price"] = json!(250.0);
    newer["expected_sale_price"] = json!(300.0);
    h.ledger.add_position(newer).await.unwrap();
    h.publisher.take().await;

    // Most recent open position wins.
    h.ledger.last_purchase_price(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!(250.0));

    h.ledger.max_sale_price(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!(300.0));

    // Closed positions drop out of both.
    h.ledger.sell_position(json!("P2")).await.unwrap();
    h.publisher.take().await;
    h.ledger.last_purchase_price(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!(100.0));
    h.ledger.max_sale_price(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!(110.0));
}

#[tokio::test]
async fn test_sell_price_update_chain() {
    let h = harness().await;

    h.ledger
        .add_position(position_payload("P1", "main", "2026-01-01T00:00:00+00:00"))
        .await
        .unwrap();
    h.publisher.take().await;

    // First leg: purchase_price 100 with +10% yields a follow-up command.
    h.ledger
        .purchase_price_for_sell_update(json!({"position_id": "P1", "percentage_change": 10.0}))
        .await
        .unwrap();
    let (topic, payload) = h.publisher.take_one().await;
    assert_eq!(topic, Topic::SellPriceUpdateInDbRequested);
    assert_eq!(payload["position_id"], "P1");
    let new_sell_price = payload["new_sell_price"].as_f64().unwrap();
    assert!((new_sell_price - 110.0).abs() < 1e-9);

    // Second leg: applying it mutates the stored expected_sale_price.
    h.ledger
        .update_sell_price(json!({"position_id": "P1", "new_sell_price": 110.0}))
        .await
        .unwrap();
    let (topic, payload) = h.publisher.take_one().await;
    assert_eq!(topic, Topic::SellPriceUpdated);
    assert_eq!(payload["new_sell_price"], json!(110.0));

    h.ledger.max_sale_price(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!(110.0));
}

#[tokio::test]
async fn test_unknown_position_yields_not_found() {
    let h = harness().await;

    h.ledger
        .purchase_price_for_sell_update(json!({"position_id": "ghost", "percentage_change": 5.0}))
        .await
        .unwrap();
    assert_eq!(
        h.publisher.take_one().await,
        (Topic::PositionNotFoundForSellUpdate, json!("ghost"))
    );

    // No state mutation on the not-found path.
    h.ledger.all_positions_data(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!([]));
}

#[tokio::test]
async fn test_cancel_events_and_positions() {
    let h = harness().await;

    h.ledger
        .add_position(position_payload("P1", "main", "2026-01-01T00:00:00+00:00"))
        .await
        .unwrap();
    h.ledger
        .add_position(position_payload("P2", "alt", "2026-01-02T00:00:00+00:00"))
        .await
        .unwrap();
    h.publisher.take().await;

    h.ledger.cancel_events(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await, (Topic::EventsCancelled, json!(true)));

    // Each BUY now has a compensating SELL, but positions stay open —
    // cancel_events is audit-only.
    for id in ["P1", "P2"] {
        let events = ledger::store::events_for(&h.pool, id).await.unwrap();
        let kinds: Vec<Operation> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![Operation::Buy, Operation::Sell]);
    }
    h.ledger.count_opened_positions(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!(2));

    h.ledger.cancel_positions(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await, (Topic::PositionsClosed, json!(true)));

    h.ledger.count_opened_positions(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!(0));
    h.ledger.all_positions_data(Value::Null).await.unwrap();
    let (_, payload) = h.publisher.take_one().await;
    assert!(payload
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["status"] == json!("closed")));
}

#[tokio::test]
async fn test_malformed_payloads_are_dropped_silently() {
    let h = harness().await;

    // Missing required fields / wrong shapes: warn + drop, no response.
    h.ledger.add_position(json!({"id": "P1"})).await.unwrap();
    h.ledger.sell_position(json!({"not": "a string"})).await.unwrap();
    h.ledger
        .purchase_price_for_sell_update(json!({"position_id": "P1"}))
        .await
        .unwrap();
    h.ledger
        .update_sell_price(json!({"new_sell_price": 1.0}))
        .await
        .unwrap();
    h.ledger.count_opened_positions(json!({"pools": 1})).await.unwrap();

    assert!(h.publisher.take().await.is_empty());

    // And nothing was written.
    h.ledger.all_positions_data(Value::Null).await.unwrap();
    assert_eq!(h.publisher.take_one().await.1, json!([]));
}
