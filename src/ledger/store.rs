//! # ledger::store
//!
//! SQL access for the two ledger tables. Mutations take a transaction's
//! connection so callers control atomicity; reads go straight to the pool.
//!
//! Pool-name filtering: a non-empty filter restricts to those pools, an
//! absent filter means all pools. "Most recent" orders by timestamp DESC and
//! takes one row; listings order by timestamp ASC for deterministic replay.

use anyhow::Context;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::ledger::model::{Operation, Position, PositionEvent};

const POSITION_COLUMNS: &str = "id, purchase_price, number_of_tokens, expected_sale_price, \
     next_purchase_price, variations, timestamp, status, pair, pool_name";

// ─── Mutations (transactional) ────────────────────────────────────────────────

pub async fn insert_position(conn: &mut SqliteConnection, p: &Position) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO positions (id, purchase_price, number_of_tokens, expected_sale_price, \
         next_purchase_price, variations, timestamp, status, pair, pool_name) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&p.id)
    .bind(p.purchase_price)
    .bind(p.number_of_tokens)
    .bind(p.expected_sale_price)
    .bind(p.next_purchase_price)
    .bind(&p.variations)
    .bind(&p.timestamp)
    .bind(p.status)
    .bind(&p.pair)
    .bind(&p.pool_name)
    .execute(&mut *conn)
    .await
    .context("insert_position failed")?;
    Ok(())
}

pub async fn append_event(
    conn: &mut SqliteConnection,
    position_id: &str,
    operation: Operation,
    timestamp: &str,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO position_events (position_id, event_type, timestamp) VALUES (?, ?, ?)")
        .bind(position_id)
        .bind(operation)
        .bind(timestamp)
        .execute(&mut *conn)
        .await
        .context("append_event failed")?;
    Ok(())
}

pub async fn close_position(conn: &mut SqliteConnection, id: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE positions SET status = 'closed' WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .context("close_position failed")?;
    Ok(())
}

pub async fn close_all_open(conn: &mut SqliteConnection) -> anyhow::Result<u64> {
    let result = sqlx::query("UPDATE positions SET status = 'closed' WHERE status = 'open'")
        .execute(&mut *conn)
        .await
        .context("close_all_open failed")?;
    Ok(result.rows_affected())
}

pub async fn update_sale_price(
    conn: &mut SqliteConnection,
    id: &str,
    new_sell_price: f64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE positions SET expected_sale_price = ? WHERE id = ?")
        .bind(new_sell_price)
        .bind(id)
        .execute(&mut *conn)
        .await
        .context("update_sale_price failed")?;
    Ok(())
}

/// Audit-only compensation: append one SELL event for every existing BUY
/// event, regardless of position status.
pub async fn compensate_buy_events(
    conn: &mut SqliteConnection,
    timestamp: &str,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        "INSERT INTO position_events (position_id, event_type, timestamp) \
         SELECT position_id, ?, ? FROM position_events WHERE event_type = ?",
    )
    .bind(Operation::Sell)
    .bind(timestamp)
    .bind(Operation::Buy)
    .execute(&mut *conn)
    .await
    .context("compensate_buy_events failed")?;
    Ok(result.rows_affected())
}

// ─── Queries ──────────────────────────────────────────────────────────────────

fn push_pool_filter(qb: &mut QueryBuilder<'_, Sqlite>, pools: Option<&[String]>) {
    if let Some(pools) = pools {
        qb.push(" AND pool_name IN (");
        let mut separated = qb.separated(", ");
        for pool in pools {
            separated.push_bind(pool.clone());
        }
        qb.push(")");
    }
}

pub async fn last_purchase_price(
    pool: &SqlitePool,
    pools: Option<&[String]>,
) -> anyhow::Result<f64> {
    let mut qb =
        QueryBuilder::new("SELECT purchase_price FROM positions WHERE status = 'open'");
    push_pool_filter(&mut qb, pools);
    qb.push(" ORDER BY timestamp DESC LIMIT 1");
    let price: Option<f64> = qb
        .build_query_scalar()
        .fetch_optional(pool)
        .await
        .context("last_purchase_price failed")?;
    Ok(price.unwrap_or(0.0))
}

pub async fn open_positions(
    pool: &SqlitePool,
    pools: Option<&[String]>,
) -> anyhow::Result<Vec<Position>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {POSITION_COLUMNS} FROM positions WHERE status = 'open'"
    ));
    push_pool_filter(&mut qb, pools);
    qb.push(" ORDER BY timestamp ASC");
    qb.build_query_as::<Position>()
        .fetch_all(pool)
        .await
        .context("open_positions failed")
}

pub async fn count_open(pool: &SqlitePool, pools: Option<&[String]>) -> anyhow::Result<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM positions WHERE status = 'open'");
    push_pool_filter(&mut qb, pools);
    qb.build_query_scalar()
        .fetch_one(pool)
        .await
        .context("count_open failed")
}

pub async fn max_sale_price(pool: &SqlitePool, pools: Option<&[String]>) -> anyhow::Result<f64> {
    let mut qb =
        QueryBuilder::new("SELECT MAX(expected_sale_price) FROM positions WHERE status = 'open'");
    push_pool_filter(&mut qb, pools);
    let max: Option<f64> = qb
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .context("max_sale_price failed")?;
    Ok(max.unwrap_or(0.0))
}

pub async fn all_positions(pool: &SqlitePool) -> anyhow::Result<Vec<Position>> {
    sqlx::query_as::<_, Position>(&format!(
        "SELECT {POSITION_COLUMNS} FROM positions ORDER BY timestamp ASC"
    ))
    .fetch_all(pool)
    .await
    .context("all_positions failed")
}

pub async fn purchase_price_by_id(pool: &SqlitePool, id: &str) -> anyhow::Result<Option<f64>> {
    sqlx::query_scalar("SELECT purchase_price FROM positions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("purchase_price_by_id failed")
}

/// Audit trail for one position, oldest first.
pub async fn events_for(pool: &SqlitePool, position_id: &str) -> anyhow::Result<Vec<PositionEvent>> {
    sqlx::query_as::<_, PositionEvent>(
        "SELECT event_id, position_id, event_type, timestamp FROM position_events \
         WHERE position_id = ? ORDER BY event_id ASC",
    )
    .bind(position_id)
    .fetch_all(pool)
    .await
    .context("events_for failed")
}
