//! # client::dispatch
//!
//! The ordered single-consumer side of the transport: a handler registry and
//! the dispatch loop that drains the envelope queue.
//!
//! Delivery contract: every dequeued envelope produces exactly one `consumed`
//! acknowledgment — handler missing, handler failed, or topic unknown alike.
//! One bad message must never halt processing of subsequent messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::envelope::{Envelope, WireFrame};
use crate::topics::Topic;

// ─── Handler Registry ─────────────────────────────────────────────────────────

/// A topic handler. Receives only the payload — topic, producer and
/// message_id are dispatcher metadata, not business input.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// At most one handler per topic, last registration wins. Registration during
/// active dispatch is safe: the lock guarantees no partial-state reads.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<Topic, Handler>>,
}

impl HandlerRegistry {
    pub fn register(&self, topic: Topic, handler: Handler) {
        if self.handlers.write().insert(topic, handler).is_some() {
            debug!(topic = %topic, "handler replaced");
        }
    }

    fn get(&self, topic: Topic) -> Option<Handler> {
        self.handlers.read().get(&topic).cloned()
    }
}

// ─── Dispatch Loop ────────────────────────────────────────────────────────────

/// Shared pieces the dispatch loop needs from the transport client.
///
/// The queue receiver sits behind an async mutex so the queue survives
/// reconnects and at most one drainer is active even when a new loop is
/// spawned while the previous one is still inside its poll window.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub consumer: String,
    pub poll: Duration,
    pub registry: Arc<HandlerRegistry>,
    pub queue: Arc<Mutex<UnboundedReceiver<Envelope>>>,
    /// Writer handle of the *current* connection; `None` while the link is down.
    pub outbound: Arc<RwLock<Option<UnboundedSender<WireFrame>>>>,
    pub running: Arc<AtomicBool>,
}

impl DispatchContext {
    /// Drain the queue until `running` flips false. The poll timeout bounds
    /// shutdown latency to one interval; no queue content is discarded on exit.
    pub(crate) async fn run(self) {
        let mut queue = self.queue.lock().await;
        debug!(consumer = %self.consumer, "dispatch loop started");
        while self.running.load(Ordering::SeqCst) {
            match tokio::time::timeout(self.poll, queue.recv()).await {
                Err(_) => continue, // poll timeout — re-check running
                Ok(None) => break,  // queue sender dropped, client is gone
                Ok(Some(envelope)) => self.process(envelope).await,
            }
        }
        debug!(consumer = %self.consumer, "dispatch loop stopped");
    }

    async fn process(&self, envelope: Envelope) {
        let Envelope { topic, message_id, message, producer } = envelope;
        debug!(
            consumer = %self.consumer,
            topic = %topic,
            message_id = %message_id,
            producer = %producer,
            "processing message"
        );

        match Topic::parse(&topic).and_then(|t| self.registry.get(t)) {
            Some(handler) => {
                // Crash isolation per message: a failing handler is logged
                // and the loop moves on.
                if let Err(e) = handler(message.clone()).await {
                    error!(consumer = %self.consumer, topic = %topic, error = ?e, "handler failed");
                }
            }
            None => warn!(consumer = %self.consumer, topic = %topic, "no handler for topic"),
        }

        let ack = WireFrame::Consumed {
            consumer: self.consumer.clone(),
            topic,
            message_id,
            message,
        };
        // A crash between dequeue and ack loses the ack (broker may
        // redeliver); a handler failure does not.
        let sent = match &*self.outbound.read() {
            Some(tx) => tx.send(ack).is_ok(),
            None => false,
        };
        if !sent {
            debug!(consumer = %self.consumer, "ack dropped, link down");
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
