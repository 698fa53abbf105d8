//! # ledger::model
//!
//! Rows of the two ledger tables plus the typed command payloads. Payload
//! shapes are keyed by topic — one concrete schema per command — and are
//! validated at the handler boundary, never trusted at runtime.

use chrono::Utc;
use serde::{Deserialize, Serialize};

// ─── Position ─────────────────────────────────────────────────────────────────

/// Lifecycle of a position: created open, closed by a sell or bulk cancel,
/// never physically deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// One row of `positions`. `timestamp` is the RFC 3339 creation time; the
/// timestamp indexes drive the "most recent" and replay-order queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Position {
    pub id: String,
    pub purchase_price: f64,
    pub number_of_tokens: f64,
    pub expected_sale_price: f64,
    pub next_purchase_price: f64,
    /// Serialized structured blob, stored verbatim.
    pub variations: String,
    pub timestamp: String,
    pub status: PositionStatus,
    pub pair: String,
    pub pool_name: String,
}

impl Position {
    /// Build an open position from an add-position command. The creation
    /// timestamp defaults to now when the caller supplies none.
    pub fn open(req: NewPositionRequest) -> Self {
        Self {
            id: req.id,
            purchase_price: req.purchase_price,
            number_of_tokens: req.number_of_tokens,
            expected_sale_price: req.expected_sale_price,
            next_purchase_price: req.next_purchase_price,
            variations: req.variations,
            timestamp: req.timestamp.unwrap_or_else(now_rfc3339),
            status: PositionStatus::Open,
            pair: req.pair,
            pool_name: req.pool_name,
        }
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

// ─── Audit Trail ──────────────────────────────────────────────────────────────

/// Audit event kind, stored as "BUY"/"SELL".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Operation {
    Buy,
    Sell,
}

/// One append-only row of `position_events`. Every position gets a BUY event
/// atomically with its insert; every close appends exactly one SELL in the
/// same transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PositionEvent {
    pub event_id: i64,
    pub position_id: String,
    pub event_type: Operation,
    pub timestamp: String,
}

// ─── Command Payloads ─────────────────────────────────────────────────────────

/// Payload of `add_position_request`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPositionRequest {
    pub id: String,
    pub purchase_price: f64,
    pub number_of_tokens: f64,
    pub expected_sale_price: f64,
    pub next_purchase_price: f64,
    pub variations: String,
    /// Optional caller-supplied creation time.
    #[serde(default)]
    pub timestamp: Option<String>,
    pub pair: String,
    pub pool_name: String,
}

/// Payload of `request_purchase_price_for_sell_update`.
#[derive(Debug, Clone, Deserialize)]
pub struct SellUpdateLookup {
    pub position_id: String,
    pub percentage_change: f64,
}

/// Payload of `sell_price_update_in_db_requested`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellPriceUpdate {
    pub position_id: String,
    pub new_sell_price: f64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
