//! # ledger
//!
//! Event-sourced position ledger: pool construction, schema startup step,
//! SQL access, and the topic handlers that own the two tables.

mod model;
mod service;

pub mod schema;
pub mod store;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub use model::{
    NewPositionRequest, Operation, Position, PositionEvent, PositionStatus, SellPriceUpdate,
    SellUpdateLookup,
};
pub use service::PositionLedger;

/// Open the SQLite pool, creating the database file if absent.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    info!(url = %database_url, "opening ledger database");
    let options = SqliteConnectOptions::from_str(database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .context("failed to open ledger database")?;
    Ok(pool)
}
