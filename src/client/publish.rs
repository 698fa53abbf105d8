//! # client::publish
//!
//! The seam between the ledger and the transport runtime. The ledger is
//! handed an `Arc<dyn EventPublisher>` rather than the client itself, so
//! tests can record responses without a broker.

use async_trait::async_trait;
use serde_json::Value;

use crate::client::transport::PubSubClient;
use crate::topics::Topic;

/// Outbound publish capability for catalog topics.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Fire-and-forget publish; implementations never surface errors.
    async fn publish(&self, topic: Topic, payload: Value);
}

#[async_trait]
impl EventPublisher for PubSubClient {
    async fn publish(&self, topic: Topic, payload: Value) {
        let producer = self.consumer().to_string();
        PubSubClient::publish(self, topic.as_str(), payload, &producer, None).await;
    }
}
