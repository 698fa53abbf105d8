//! # envelope
//!
//! The broker wire contract: a four-field [`Envelope`] carried inside
//! event-tagged [`WireFrame`]s.
//!
//! | event       | data                                       | direction |
//! |-------------|--------------------------------------------|-----------|
//! | `subscribe` | `{consumer, topics}`                       | outbound  |
//! | `message`   | an `Envelope`                              | inbound   |
//! | `consumed`  | `{consumer, topic, message_id, message}`   | outbound  |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ─── Envelope ─────────────────────────────────────────────────────────────────

/// A topic-addressed message. `message_id` is unique per envelope and is
/// round-tripped unchanged from publish to acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub message_id: String,
    /// Opaque payload — the dispatcher hands this (and only this) to handlers.
    pub message: Value,
    pub producer: String,
}

impl Envelope {
    /// Build an envelope, generating a UUIDv4 id when the caller supplies none.
    pub fn new(topic: &str, message: Value, producer: &str, message_id: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            message_id: message_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            message,
            producer: producer.to_string(),
        }
    }
}

// ─── Wire Frames ──────────────────────────────────────────────────────────────

/// Every frame exchanged with the broker over the WebSocket link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WireFrame {
    /// Subscription handshake, sent once per successful connection.
    Subscribe {
        consumer: String,
        topics: Vec<String>,
    },
    /// Inbound delivery from the broker.
    Message(Envelope),
    /// Delivery acknowledgment, emitted exactly once per dequeued envelope.
    Consumed {
        consumer: String,
        topic: String,
        message_id: String,
        message: Value,
    },
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Envelope::new("t", json!(1), "p", None);
        let b = Envelope::new("t", json!(1), "p", None);
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn test_caller_supplied_id_is_kept() {
        let e = Envelope::new("t", json!(null), "p", Some("id-7".into()));
        assert_eq!(e.message_id, "id-7");
    }

    #[test]
    fn test_subscribe_frame_shape() {
        let frame = WireFrame::Subscribe {
            consumer: "position-ledger".into(),
            topics: vec!["add_position_request".into()],
        };
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["event"], "subscribe");
        assert_eq!(v["data"]["consumer"], "position-ledger");
        assert_eq!(v["data"]["topics"][0], "add_position_request");
    }

    #[test]
    fn test_message_frame_round_trip() {
        let raw = r#"{
            "event": "message",
            "data": {
                "topic": "sell_position_request",
                "message_id": "m-1",
                "message": "P1",
                "producer": "orchestrator"
            }
        }"#;
        match serde_json::from_str::<WireFrame>(raw).unwrap() {
            WireFrame::Message(envelope) => {
                assert_eq!(envelope.topic, "sell_position_request");
                assert_eq!(envelope.message, json!("P1"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_consumed_frame_shape() {
        let frame = WireFrame::Consumed {
            consumer: "position-ledger".into(),
            topic: "add_position_request".into(),
            message_id: "m-2".into(),
            message: json!({"id": "P1"}),
        };
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["event"], "consumed");
        assert_eq!(v["data"]["message_id"], "m-2");
        assert_eq!(v["data"]["message"]["id"], "P1");
    }

    // Publish-then-deliver round trip: the payload survives serialization to
    // the wire and back bit-identical.
    #[test]
    fn test_payload_round_trips_unchanged() {
        let payload = json!({"id": "P1", "variations": "[]", "purchase_price": 100.0});
        let out = Envelope::new("add_position_request", payload.clone(), "bot", None);
        let wire = serde_json::to_string(&WireFrame::Message(out.clone())).unwrap();
        match serde_json::from_str::<WireFrame>(&wire).unwrap() {
            WireFrame::Message(back) => {
                assert_eq!(back, out);
                assert_eq!(back.message, payload);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
