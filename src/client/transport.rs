//! # client::transport
//!
//! One logical connection to the pub/sub broker.
//!
//! Inbound: a WebSocket link that delivers `message` frames into an unbounded
//! FIFO queue, reconnecting forever with capped doubling backoff. Outbound:
//! fire-and-forget HTTP POSTs to the broker's `/publish` endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

use crate::client::dispatch::{DispatchContext, HandlerRegistry};
use crate::config::Config;
use crate::envelope::{Envelope, WireFrame};
use crate::error::TransportError;
use crate::topics::Topic;

// ─── Backoff ──────────────────────────────────────────────────────────────────

/// Doubling reconnect delay with a cap, reset on every successful connection.
struct Backoff {
    delay: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self { delay: initial, initial, max }
    }

    fn next(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (self.delay * 2).min(self.max);
        current
    }

    fn reset(&mut self) {
        self.delay = self.initial;
    }
}

// ─── PubSubClient ─────────────────────────────────────────────────────────────

/// Client for the publish-subscribe broker.
///
/// Owns the envelope queue and the handler registry; it has no knowledge of
/// what the handlers do with the payloads.
pub struct PubSubClient {
    broker_url: String,
    consumer: String,
    topics: Vec<String>,
    registry: Arc<HandlerRegistry>,
    http: reqwest::Client,
    publish_timeout: Duration,
    poll_interval: Duration,
    reconnect_delay: Duration,
    reconnect_delay_max: Duration,
    queue_tx: UnboundedSender<Envelope>,
    queue_rx: Arc<Mutex<UnboundedReceiver<Envelope>>>,
    /// Writer handle of the current connection; `None` while disconnected.
    outbound: Arc<RwLock<Option<UnboundedSender<WireFrame>>>>,
    running: Arc<AtomicBool>,
}

impl PubSubClient {
    pub fn new(cfg: &Config, topics: &[Topic]) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            broker_url: cfg.broker_url.trim_end_matches('/').to_string(),
            consumer: cfg.consumer.clone(),
            topics: topics.iter().map(|t| t.as_str().to_string()).collect(),
            registry: Arc::new(HandlerRegistry::default()),
            http: reqwest::Client::new(),
            publish_timeout: cfg.publish_timeout,
            poll_interval: cfg.poll_interval,
            reconnect_delay: cfg.reconnect_delay,
            reconnect_delay_max: cfg.reconnect_delay_max,
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            outbound: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The handler registry — register one handler per topic before (or
    /// during) dispatch; the last registration for a topic wins.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Connect and serve until the process dies. Blocks the calling task for
    /// the connection lifetime; link loss falls back to reconnection with
    /// capped doubling backoff.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = Backoff::new(self.reconnect_delay, self.reconnect_delay_max);
        loop {
            match self.drive_connection().await {
                Ok(()) => {
                    info!(consumer = %self.consumer, "disconnected from broker");
                    backoff.reset();
                }
                Err(e) => warn!(consumer = %self.consumer, error = %e, "broker connection failed"),
            }
            self.on_disconnected();
            let delay = backoff.next();
            debug!(consumer = %self.consumer, ?delay, "reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection session: handshake, spawn the writer and (if needed)
    /// the dispatch loop, then read frames until the link drops.
    async fn drive_connection(self: &Arc<Self>) -> Result<(), TransportError> {
        let ws_url = ws_endpoint(&self.broker_url);
        let (stream, _) = connect_async(ws_url.as_str()).await?;
        info!(consumer = %self.consumer, url = %ws_url, "connected to broker");

        let (mut write, mut read) = stream.split();

        // Writer task: serializes frames onto the socket. It ends when the
        // outbound channel is dropped or the socket rejects a write.
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WireFrame>();
        let writer_consumer = self.consumer.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(t) => t,
                    Err(e) => {
                        error!(consumer = %writer_consumer, error = %e, "frame encode failed");
                        continue;
                    }
                };
                if write.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        out_tx
            .send(WireFrame::Subscribe {
                consumer: self.consumer.clone(),
                topics: self.topics.clone(),
            })
            .map_err(|_| TransportError::ChannelClosed)?;
        *self.outbound.write() = Some(out_tx);

        // Exactly one dispatch loop across reconnects: spawn only when
        // `running` was false. A loop from the previous session keeps
        // draining and picks up the new writer handle through `outbound`.
        if !self.running.swap(true, Ordering::SeqCst) {
            tokio::spawn(self.dispatch_context().run());
        }

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<WireFrame>(&text) {
                    Ok(WireFrame::Message(envelope)) => {
                        debug!(
                            consumer = %self.consumer,
                            topic = %envelope.topic,
                            message_id = %envelope.message_id,
                            "queuing message"
                        );
                        // Receiver lives in this struct, so this cannot fail.
                        let _ = self.queue_tx.send(envelope);
                    }
                    Ok(other) => trace!(?other, "ignoring non-delivery frame"),
                    Err(e) => warn!(consumer = %self.consumer, error = %e, "undecodable frame"),
                },
                Ok(Message::Close(_)) => {
                    info!(consumer = %self.consumer, "broker closed the link");
                    break;
                }
                Ok(Message::Ping(_)) => trace!("ping"),
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Stop dispatch (cooperatively, within one poll interval) and drop the
    /// stale writer handle. Queue content is kept; a reconnect resumes
    /// draining where we left off.
    fn on_disconnected(&self) {
        self.running.store(false, Ordering::SeqCst);
        *self.outbound.write() = None;
    }

    fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            consumer: self.consumer.clone(),
            poll: self.poll_interval,
            registry: Arc::clone(&self.registry),
            queue: Arc::clone(&self.queue_rx),
            outbound: Arc::clone(&self.outbound),
            running: Arc::clone(&self.running),
        }
    }

    /// Publish an envelope via HTTP POST to `<broker>/publish`.
    ///
    /// Fire-and-forget: every failure (network, non-2xx, timeout) is logged
    /// and swallowed. Callers needing guaranteed delivery must make the
    /// receiving handlers idempotent.
    pub async fn publish(
        &self,
        topic: &str,
        message: Value,
        producer: &str,
        message_id: Option<String>,
    ) {
        let envelope = Envelope::new(topic, message, producer, message_id);
        let url = format!("{}/publish", self.broker_url);
        debug!(
            consumer = %self.consumer,
            topic = %envelope.topic,
            message_id = %envelope.message_id,
            "publishing"
        );
        match self
            .http
            .post(&url)
            .json(&envelope)
            .timeout(self.publish_timeout)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                trace!(topic = %envelope.topic, status = %resp.status(), "publish accepted");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!(
                    consumer = %self.consumer,
                    topic = %envelope.topic,
                    %status,
                    body = %body,
                    "publish rejected"
                );
            }
            Err(e) => {
                error!(consumer = %self.consumer, topic = %envelope.topic, error = %e, "publish failed");
            }
        }
    }
}

/// Derive the WebSocket endpoint from the broker's http(s) base URL.
fn ws_endpoint(broker_url: &str) -> String {
    if let Some(rest) = broker_url.strip_prefix("https://") {
        format!("wss://{rest}/ws")
    } else if let Some(rest) = broker_url.strip_prefix("http://") {
        format!("ws://{rest}/ws")
    } else {
        format!("{broker_url}/ws")
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_endpoint_schemes() {
        assert_eq!(ws_endpoint("http://localhost:5000"), "ws://localhost:5000/ws");
        assert_eq!(ws_endpoint("https://broker.example"), "wss://broker.example/ws");
        assert_eq!(ws_endpoint("ws://broker.example"), "ws://broker.example/ws");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut b = Backoff::new(Duration::from_secs(2), Duration::from_secs(10));
        assert_eq!(b.next(), Duration::from_secs(2));
        assert_eq!(b.next(), Duration::from_secs(4));
        assert_eq!(b.next(), Duration::from_secs(8));
        assert_eq!(b.next(), Duration::from_secs(10));
        assert_eq!(b.next(), Duration::from_secs(10));
        b.reset();
        assert_eq!(b.next(), Duration::from_secs(2));
    }
}
