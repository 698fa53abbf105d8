//! # client
//!
//! Pub/sub transport runtime: connection lifecycle, ordered dispatch,
//! acknowledgment, and outbound publish.

mod dispatch;
mod publish;
mod transport;

pub use dispatch::{Handler, HandlerRegistry};
pub use publish::EventPublisher;
pub use transport::PubSubClient;
