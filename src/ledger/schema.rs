//! # ledger::schema
//!
//! Startup schema step — runs once per process start, idempotent.
//!
//! The embedded base migration creates the two tables and the timestamp /
//! status indexes. Databases written before the pool rename still carry a
//! `use_case` column on `positions`; it is renamed in place (and its index
//! dropped) before the `pool_name` index is created. Callers treat any
//! failure here as non-fatal: the schema is assumed to be already current.

use anyhow::Context;
use sqlx::{Executor, Row, SqlitePool};
use tracing::info;

pub async fn initialize(pool: &SqlitePool) -> anyhow::Result<()> {
    pool.execute(include_str!("../../migrations/001_init.sql"))
        .await
        .context("base schema migration failed")?;

    let columns = sqlx::query("PRAGMA table_info(positions)")
        .fetch_all(pool)
        .await
        .context("failed to inspect positions table")?;
    let has_legacy_column = columns
        .iter()
        .any(|row| row.get::<String, _>("name") == "use_case");

    if has_legacy_column {
        info!("migrating legacy 'use_case' column to 'pool_name'");
        pool.execute("ALTER TABLE positions RENAME COLUMN use_case TO pool_name")
            .await
            .context("legacy column rename failed")?;
        pool.execute("DROP INDEX IF EXISTS idx_positions_use_case")
            .await
            .context("legacy index drop failed")?;
    }

    pool.execute("CREATE INDEX IF NOT EXISTS idx_positions_pool_name ON positions (pool_name)")
        .await
        .context("pool_name index creation failed")?;

    info!("database schema initialized");
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
