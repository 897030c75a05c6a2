use crate::api::models::Message;
use serde::{Deserialize, Serialize};

/// Inbound frame on the live channel: `{"event": <kind>, "data": {...}}`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    NewMessage(Message),
    NewMatch(Option<serde_json::Value>),
    TradeConfirmed(Option<serde_json::Value>),
    MatchCancelled(Option<serde_json::Value>),
    TradeConfirmationPending(Option<serde_json::Value>),
    Pong,
}

impl LiveEvent {
    /// Malformed JSON and unknown kinds come back as `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(event) => Some(event),
            Err(e) => {
                log::debug!("dropping live frame: {e}");
                None
            }
        }
    }

    /// True for the events that only mean "the match list changed".
    pub fn is_match_status_change(&self) -> bool {
        matches!(
            self,
            LiveEvent::TradeConfirmed(_) | LiveEvent::MatchCancelled(_) | LiveEvent::TradeConfirmationPending(_)
        )
    }
}

/// Outbound frame written to the live channel.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Message { content: String },
    Ping,
}
