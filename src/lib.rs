//! # positron
//!
//! Messaging-and-persistence substrate of a trading platform: a pub/sub
//! transport client that delivers topic-addressed envelopes in order to
//! registered handlers, and an event-sourced position ledger built on top of
//! it that owns the canonical record of trading positions and their audit
//! trail.
//!
//! ```text
//!  broker ──ws `message`──▶ queue ──▶ dispatch loop ──▶ ledger handler
//!                                         │                  │
//!  broker ◀──ws `consumed`────────────────┘                  ▼
//!  broker ◀──HTTP POST /publish────────────────── response envelope
//! ```

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod ledger;
pub mod topics;
