//! # topics
//!
//! The closed topic catalog — the effective API surface of the ledger.
//!
//! Adding a capability means adding a new command/response topic pair here,
//! never overloading an existing topic's payload shape.

use std::fmt;

/// Every topic the system sends or receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    // ── Command topics (consumed by the ledger) ──────────────────────────────
    AddPositionRequest,
    SellPositionRequest,
    RequestLastPurchasePrice,
    RequestOpenedPositions,
    RequestCountOpenedPositions,
    RequestMaxSalePrice,
    RequestAllPositionsData,
    RequestPurchasePriceForSellUpdate,
    SellPriceUpdateInDbRequested,
    CancelEventsRequest,
    CancelPositionsRequest,

    // ── Response topics (published by the ledger) ─────────────────────────────
    PositionOpened,
    PositionSold,
    LastPurchasePriceRetrieved,
    OpenedPositionsRetrieved,
    OpenedPositionsCountRetrieved,
    MaxSalePriceRetrieved,
    AllPositionsRetrieved,
    PositionNotFoundForSellUpdate,
    SellPriceUpdated,
    EventsCancelled,
    PositionsClosed,
}

impl Topic {
    /// The command topics the ledger subscribes to on connect.
    pub const COMMANDS: [Topic; 11] = [
        Topic::AddPositionRequest,
        Topic::SellPositionRequest,
        Topic::RequestLastPurchasePrice,
        Topic::RequestOpenedPositions,
        Topic::RequestCountOpenedPositions,
        Topic::RequestMaxSalePrice,
        Topic::RequestAllPositionsData,
        Topic::RequestPurchasePriceForSellUpdate,
        Topic::SellPriceUpdateInDbRequested,
        Topic::CancelEventsRequest,
        Topic::CancelPositionsRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::AddPositionRequest => "add_position_request",
            Topic::SellPositionRequest => "sell_position_request",
            Topic::RequestLastPurchasePrice => "request_last_purchase_price",
            Topic::RequestOpenedPositions => "request_opened_positions",
            Topic::RequestCountOpenedPositions => "request_count_opened_positions",
            Topic::RequestMaxSalePrice => "request_max_sale_price",
            Topic::RequestAllPositionsData => "request_all_positions_data",
            Topic::RequestPurchasePriceForSellUpdate => "request_purchase_price_for_sell_update",
            Topic::SellPriceUpdateInDbRequested => "sell_price_update_in_db_requested",
            Topic::CancelEventsRequest => "cancel_events_request",
            Topic::CancelPositionsRequest => "cancel_positions_request",
            Topic::PositionOpened => "position_opened",
            Topic::PositionSold => "position_sold",
            Topic::LastPurchasePriceRetrieved => "last_purchase_price_retrieved",
            Topic::OpenedPositionsRetrieved => "opened_positions_retrieved",
            Topic::OpenedPositionsCountRetrieved => "opened_positions_count_retrieved",
            Topic::MaxSalePriceRetrieved => "max_sale_price_retrieved",
            Topic::AllPositionsRetrieved => "all_positions_retrieved",
            Topic::PositionNotFoundForSellUpdate => "position_not_found_for_sell_update",
            Topic::SellPriceUpdated => "sell_price_updated",
            Topic::EventsCancelled => "events_cancelled",
            Topic::PositionsClosed => "positions_closed",
        }
    }

    /// Resolve a wire topic string. `None` means the topic is outside the
    /// catalog — the envelope is still acknowledged, just never handled.
    pub fn parse(s: &str) -> Option<Topic> {
        let topic = match s {
            "add_position_request" => Topic::AddPositionRequest,
            "sell_position_request" => Topic::SellPositionRequest,
            "request_last_purchase_price" => Topic::RequestLastPurchasePrice,
            "request_opened_positions" => Topic::RequestOpenedPositions,
            "request_count_opened_positions" => Topic::RequestCountOpenedPositions,
            "request_max_sale_price" => Topic::RequestMaxSalePrice,
            "request_all_positions_data" => Topic::RequestAllPositionsData,
            "request_purchase_price_for_sell_update" => Topic::RequestPurchasePriceForSellUpdate,
            "sell_price_update_in_db_requested" => Topic::SellPriceUpdateInDbRequested,
            "cancel_events_request" => Topic::CancelEventsRequest,
            "cancel_positions_request" => Topic::CancelPositionsRequest,
            "position_opened" => Topic::PositionOpened,
            "position_sold" => Topic::PositionSold,
            "last_purchase_price_retrieved" => Topic::LastPurchasePriceRetrieved,
            "opened_positions_retrieved" => Topic::OpenedPositionsRetrieved,
            "opened_positions_count_retrieved" => Topic::OpenedPositionsCountRetrieved,
            "max_sale_price_retrieved" => Topic::MaxSalePriceRetrieved,
            "all_positions_retrieved" => Topic::AllPositionsRetrieved,
            "position_not_found_for_sell_update" => Topic::PositionNotFoundForSellUpdate,
            "sell_price_updated" => Topic::SellPriceUpdated,
            "events_cancelled" => Topic::EventsCancelled,
            "positions_closed" => Topic::PositionsClosed,
            _ => return None,
        };
        Some(topic)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_topics_round_trip() {
        for topic in Topic::COMMANDS {
            assert_eq!(Topic::parse(topic.as_str()), Some(topic));
        }
    }

    #[test]
    fn test_response_topics_round_trip() {
        let responses = [
            Topic::PositionOpened,
            Topic::PositionSold,
            Topic::LastPurchasePriceRetrieved,
            Topic::OpenedPositionsRetrieved,
            Topic::OpenedPositionsCountRetrieved,
            Topic::MaxSalePriceRetrieved,
            Topic::AllPositionsRetrieved,
            Topic::PositionNotFoundForSellUpdate,
            Topic::SellPriceUpdated,
            Topic::EventsCancelled,
            Topic::PositionsClosed,
        ];
        for topic in responses {
            assert_eq!(Topic::parse(topic.as_str()), Some(topic));
        }
    }

    #[test]
    fn test_unknown_topic_is_none() {
        assert_eq!(Topic::parse("order_book_snapshot"), None);
    }
}
