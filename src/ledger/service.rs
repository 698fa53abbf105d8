//! # ledger::service
//!
//! The position ledger: one handler per command topic, each parsing its
//! payload at the boundary, mutating inside a single transaction, and
//! answering on the matching response topic.
//!
//! Failure policy per handler:
//! - malformed payload → warn and drop, no response (callers detect by timeout)
//! - storage error with a defined failure shape → respond `false` / `[]` / `0` / `0.0`
//! - storage error on a silent-by-design path → propagate; the dispatcher logs it

use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::client::{EventPublisher, HandlerRegistry};
use crate::ledger::model::{
    now_rfc3339, NewPositionRequest, Operation, Position, SellPriceUpdate, SellUpdateLookup,
};
use crate::ledger::store;
use crate::topics::Topic;

/// Registers `ledger.method` as the handler for a command topic.
macro_rules! route {
    ($registry:expr, $ledger:expr, $topic:expr, $method:ident) => {{
        let ledger = Arc::clone($ledger);
        $registry.register(
            $topic,
            Arc::new(move |payload| {
                let ledger = Arc::clone(&ledger);
                async move { ledger.$method(payload).await }.boxed()
            }),
        );
    }};
}

/// Authoritative store for trading positions, exposed exclusively through
/// request/response topics. Owns the `positions` and `position_events`
/// tables; nothing else reads or writes them.
pub struct PositionLedger {
    pool: SqlitePool,
    publisher: Arc<dyn EventPublisher>,
}

impl PositionLedger {
    pub fn new(pool: SqlitePool, publisher: Arc<dyn EventPublisher>) -> Arc<Self> {
        Arc::new(Self { pool, publisher })
    }

    /// Wire every command topic to its handler. Call once before the
    /// transport starts dispatching.
    pub fn register(self: &Arc<Self>, registry: &HandlerRegistry) {
        route!(registry, self, Topic::AddPositionRequest, add_position);
        route!(registry, self, Topic::SellPositionRequest, sell_position);
        route!(registry, self, Topic::RequestLastPurchasePrice, last_purchase_price);
        route!(registry, self, Topic::RequestOpenedPositions, opened_positions);
        route!(registry, self, Topic::RequestCountOpenedPositions, count_opened_positions);
        route!(registry, self, Topic::RequestMaxSalePrice, max_sale_price);
        route!(registry, self, Topic::RequestAllPositionsData, all_positions_data);
        route!(
            registry,
            self,
            Topic::RequestPurchasePriceForSellUpdate,
            purchase_price_for_sell_update
        );
        route!(registry, self, Topic::SellPriceUpdateInDbRequested, update_sell_price);
        route!(registry, self, Topic::CancelEventsRequest, cancel_events);
        route!(registry, self, Topic::CancelPositionsRequest, cancel_positions);
        info!("ledger handlers registered");
    }

    // ─── Lifecycle Commands ───────────────────────────────────────────────────

    /// Insert an open position and its BUY audit event atomically, then
    /// answer with the full position record.
    pub async fn add_position(&self, payload: Value) -> anyhow::Result<()> {
        let req: NewPositionRequest = match serde_json::from_value(payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "malformed add_position_request payload");
                return Ok(());
            }
        };
        let position = Position::open(req);

        let inserted: anyhow::Result<()> = async {
            let mut tx = self.pool.begin().await?;
            store::insert_position(&mut tx, &position).await?;
            store::append_event(&mut tx, &position.id, Operation::Buy, &now_rfc3339()).await?;
            tx.commit().await?;
            Ok(())
        }
        .await;

        match inserted {
            Ok(()) => {
                info!(id = %position.id, pool = %position.pool_name, "position opened");
                self.publisher.publish(Topic::PositionOpened, json!(position)).await;
            }
            Err(e) => error!(id = %position.id, error = ?e, "failed to open position"),
        }
        Ok(())
    }

    /// Close one position and append its SELL event atomically, then answer
    /// with the position id.
    pub async fn sell_position(&self, payload: Value) -> anyhow::Result<()> {
        let id: String = match serde_json::from_value(payload) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "malformed sell_position_request payload");
                return Ok(());
            }
        };

        let closed: anyhow::Result<()> = async {
            let mut tx = self.pool.begin().await?;
            store::close_position(&mut tx, &id).await?;
            store::append_event(&mut tx, &id, Operation::Sell, &now_rfc3339()).await?;
            tx.commit().await?;
            Ok(())
        }
        .await;

        match closed {
            Ok(()) => {
                info!(id = %id, "position sold");
                self.publisher.publish(Topic::PositionSold, json!(id)).await;
            }
            Err(e) => error!(id = %id, error = ?e, "failed to sell position"),
        }
        Ok(())
    }

    // ─── Query Commands ───────────────────────────────────────────────────────

    /// Most recent open position's purchase price; 0.0 when none exist (or
    /// on error — the failure shape doubles as the empty shape).
    pub async fn last_purchase_price(&self, payload: Value) -> anyhow::Result<()> {
        let Some(pools) = self.pool_filter(payload, Topic::RequestLastPurchasePrice) else {
            return Ok(());
        };
        let price = store::last_purchase_price(&self.pool, pools.as_deref())
            .await
            .unwrap_or_else(|e| {
                error!(error = ?e, "last purchase price lookup failed");
                0.0
            });
        self.publisher
            .publish(Topic::LastPurchasePriceRetrieved, json!(price))
            .await;
        Ok(())
    }

    /// All open positions, oldest first; empty list on error.
    pub async fn opened_positions(&self, payload: Value) -> anyhow::Result<()> {
        let Some(pools) = self.pool_filter(payload, Topic::RequestOpenedPositions) else {
            return Ok(());
        };
        let positions = store::open_positions(&self.pool, pools.as_deref())
            .await
            .unwrap_or_else(|e| {
                error!(error = ?e, "opened positions lookup failed");
                Vec::new()
            });
        self.publisher
            .publish(Topic::OpenedPositionsRetrieved, json!(positions))
            .await;
        Ok(())
    }

    /// Count of open positions; 0 on error.
    pub async fn count_opened_positions(&self, payload: Value) -> anyhow::Result<()> {
        let Some(pools) = self.pool_filter(payload, Topic::RequestCountOpenedPositions) else {
            return Ok(());
        };
        let count = store::count_open(&self.pool, pools.as_deref())
            .await
            .unwrap_or_else(|e| {
                error!(error = ?e, "open position count failed");
                0
            });
        self.publisher
            .publish(Topic::OpenedPositionsCountRetrieved, json!(count))
            .await;
        Ok(())
    }

    /// Max expected sale price over open positions; 0.0 when none/null or on error.
    pub async fn max_sale_price(&self, payload: Value) -> anyhow::Result<()> {
        let Some(pools) = self.pool_filter(payload, Topic::RequestMaxSalePrice) else {
            return Ok(());
        };
        let price = store::max_sale_price(&self.pool, pools.as_deref())
            .await
            .unwrap_or_else(|e| {
                error!(error = ?e, "max sale price lookup failed");
                0.0
            });
        self.publisher
            .publish(Topic::MaxSalePriceRetrieved, json!(price))
            .await;
        Ok(())
    }

    /// Every position regardless of status, oldest first; empty list on error.
    pub async fn all_positions_data(&self, _payload: Value) -> anyhow::Result<()> {
        let positions = store::all_positions(&self.pool).await.unwrap_or_else(|e| {
            error!(error = ?e, "all positions lookup failed");
            Vec::new()
        });
        self.publisher
            .publish(Topic::AllPositionsRetrieved, json!(positions))
            .await;
        Ok(())
    }

    // ─── Sell-Price Update Chain ──────────────────────────────────────────────

    /// First leg of the sell-price revision: look up the purchase price and
    /// republish the computed target as a `sell_price_update_in_db_requested`
    /// command. Unknown ids get a not-found response; storage errors are
    /// silent by design (callers apply their own timeout).
    pub async fn purchase_price_for_sell_update(&self, payload: Value) -> anyhow::Result<()> {
        let req: SellUpdateLookup = match serde_json::from_value(payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "malformed request_purchase_price_for_sell_update payload");
                return Ok(());
            }
        };

        match store::purchase_price_by_id(&self.pool, &req.position_id).await? {
            None => {
                self.publisher
                    .publish(Topic::PositionNotFoundForSellUpdate, json!(req.position_id))
                    .await;
            }
            Some(purchase_price) => {
                let update = SellPriceUpdate {
                    new_sell_price: purchase_price * (1.0 + req.percentage_change / 100.0),
                    position_id: req.position_id,
                };
                self.publisher
                    .publish(Topic::SellPriceUpdateInDbRequested, json!(update))
                    .await;
            }
        }
        Ok(())
    }

    /// Second leg: apply the new expected sale price. Storage errors are
    /// silent by design.
    pub async fn update_sell_price(&self, payload: Value) -> anyhow::Result<()> {
        let update: SellPriceUpdate = match serde_json::from_value(payload) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "malformed sell_price_update_in_db_requested payload");
                return Ok(());
            }
        };

        let mut tx = self.pool.begin().await?;
        store::update_sale_price(&mut tx, &update.position_id, update.new_sell_price).await?;
        tx.commit().await?;

        info!(
            id = %update.position_id,
            new_sell_price = update.new_sell_price,
            "sell price updated"
        );
        self.publisher.publish(Topic::SellPriceUpdated, json!(update)).await;
        Ok(())
    }

    // ─── Bulk Cancellation ────────────────────────────────────────────────────

    /// Append a compensating SELL event for every existing BUY event. This is
    /// audit-only and deliberately independent of `cancel_positions`.
    pub async fn cancel_events(&self, _payload: Value) -> anyhow::Result<()> {
        let compensated: anyhow::Result<u64> = async {
            let mut tx = self.pool.begin().await?;
            let appended = store::compensate_buy_events(&mut tx, &now_rfc3339()).await?;
            tx.commit().await?;
            Ok(appended)
        }
        .await;

        let ok = match compensated {
            Ok(appended) => {
                info!(appended, "buy events compensated");
                true
            }
            Err(e) => {
                error!(error = ?e, "event compensation failed");
                false
            }
        };
        self.publisher.publish(Topic::EventsCancelled, json!(ok)).await;
        Ok(())
    }

    /// Close every currently-open position.
    pub async fn cancel_positions(&self, _payload: Value) -> anyhow::Result<()> {
        let closed: anyhow::Result<u64> = async {
            let mut tx = self.pool.begin().await?;
            let closed = store::close_all_open(&mut tx).await?;
            tx.commit().await?;
            Ok(closed)
        }
        .await;

        let ok = match closed {
            Ok(count) => {
                info!(count, "open positions closed");
                true
            }
            Err(e) => {
                error!(error = ?e, "bulk position close failed");
                false
            }
        };
        self.publisher.publish(Topic::PositionsClosed, json!(ok)).await;
        Ok(())
    }

    // ─── Helpers ──────────────────────────────────────────────────────────────

    /// Parse an optional pool-name filter. Null/absent and the empty list
    /// both mean "all pools"; a wrong-shaped payload is a malformed request
    /// and the outer `None` tells the caller to drop it.
    fn pool_filter(&self, payload: Value, topic: Topic) -> Option<Option<Vec<String>>> {
        if payload.is_null() {
            return Some(None);
        }
        match serde_json::from_value::<Vec<String>>(payload) {
            Ok(pools) if pools.is_empty() => Some(None),
            Ok(pools) => Some(Some(pools)),
            Err(e) => {
                warn!(topic = %topic, error = %e, "malformed pool filter payload");
                None
            }
        }
    }
}
