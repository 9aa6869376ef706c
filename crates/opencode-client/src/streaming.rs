use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::buffer_utils::SseLineParser;
use crate::types::lenient::value_to_string;

pub const DELTA_EVENT: &str = "message.part.delta";
pub const IDLE_EVENT: &str = "session.idle";
pub const ERROR_EVENT: &str = "session.error";

const UNKNOWN_ERROR: &str = "Unknown error";

/// A decoded server push event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant output for one message
    Delta {
        session_id: String,
        message_id: String,
        delta: String,
    },

    /// The assistant finished its turn
    Idle { session_id: String },

    Error { session_id: String, message: String },
}

impl StreamEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Delta { session_id, .. }
            | Self::Idle { session_id }
            | Self::Error { session_id, .. } => session_id,
        }
    }

    /// Decode one SSE payload (`{type, properties}`)
    ///
    /// Returns `None` for invalid JSON, unknown event types, events without a
    /// `properties` object and empty deltas.
    pub fn from_data(data: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(data) {
            Ok(envelope) => Self::from_envelope(&envelope),
            Err(e) => {
                tracing::debug!("Ignoring non-JSON event payload: {}", e);
                None
            }
        }
    }

    pub fn from_envelope(envelope: &Value) -> Option<Self> {
        let event_type = envelope.get("type").and_then(Value::as_str).unwrap_or_default();
        let Some(props) = envelope.get("properties").filter(|p| p.is_object()) else {
            tracing::debug!(event_type, "Ignoring event without properties");
            return None;
        };

        let field = |name: &str| props.get(name).and_then(value_to_string).unwrap_or_default();
        let session_id = field("sessionID");

        match event_type {
            DELTA_EVENT => {
                let delta = field("delta");
                if delta.is_empty() {
                    return None;
                }
                Some(Self::Delta {
                    session_id,
                    message_id: field("messageID"),
                    delta,
                })
            }
            IDLE_EVENT => Some(Self::Idle { session_id }),
            ERROR_EVENT => Some(Self::Error {
                session_id,
                message: error_message(props.get("error")),
            }),
            other => {
                tracing::debug!(event_type = other, "Ignoring unhandled event type");
                None
            }
        }
    }
}

/// Human-readable text for a `session.error` payload
fn error_message(error: Option<&Value>) -> String {
    let text = match error {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(obj @ Value::Object(_)) => obj
            .get("message")
            .or_else(|| obj.get("data").and_then(|d| d.get("message")))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(obj.to_string())),
        Some(other) => value_to_string(other),
    };

    text.filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

/// Item yielded by a channel-based event subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    Event(StreamEvent),
    Connected,
    Disconnected,
}

/// Decodes the OpenCode `/event` payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCodeEventParser;

impl SseLineParser for OpenCodeEventParser {
    type Event = StreamEvent;

    fn parse_data(&self, data: &str) -> Option<StreamEvent> {
        StreamEvent::from_data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delta_event() {
        let event = StreamEvent::from_envelope(&json!({
            "type": "message.part.delta",
            "properties": {"sessionID": "s1", "messageID": "m1", "delta": "Hel"}
        }));
        assert_eq!(
            event,
            Some(StreamEvent::Delta {
                session_id: "s1".into(),
                message_id: "m1".into(),
                delta: "Hel".into(),
            })
        );
    }

    #[test]
    fn test_empty_delta_is_dropped() {
        let event = StreamEvent::from_envelope(&json!({
            "type": "message.part.delta",
            "properties": {"sessionID": "s1", "messageID": "m1", "delta": ""}
        }));
        assert_eq!(event, None);
    }

    #[test]
    fn test_missing_properties_ignored() {
        assert_eq!(StreamEvent::from_envelope(&json!({"type": "session.idle"})), None);
        assert_eq!(
            StreamEvent::from_envelope(&json!({"type": "session.idle", "properties": "x"})),
            None
        );
    }

    #[test]
    fn test_error_message_defaults() {
        let event = StreamEvent::from_envelope(&json!({
            "type": "session.error",
            "properties": {"sessionID": "s1"}
        }));
        assert_eq!(
            event,
            Some(StreamEvent::Error {
                session_id: "s1".into(),
                message: "Unknown error".into(),
            })
        );
    }

    #[test]
    fn test_error_object_rendering() {
        assert_eq!(error_message(Some(&json!("boom"))), "boom");
        assert_eq!(
            error_message(Some(&json!({"name": "APIError", "data": {"message": "rate limited"}}))),
            "rate limited"
        );
        assert_eq!(error_message(Some(&json!({"code": 7}))), r#"{"code":7}"#);
        assert_eq!(error_message(Some(&json!(""))), "Unknown error");
    }

    #[test]
    fn test_unknown_and_invalid_payloads() {
        assert_eq!(StreamEvent::from_data("not json"), None);
        assert_eq!(
            StreamEvent::from_data(r#"{"type":"server.connected","properties":{}}"#),
            None
        );

        let idle = StreamEvent::from_data(r#"{"type":"session.idle","properties":{"sessionID":"s9"}}"#)
            .unwrap();
        assert_eq!(idle.session_id(), "s9");
    }
}
