use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use super::lenient;

/// A typed unit of message content
///
/// Dispatch happens on the `type` field. Tags this client does not know about
/// decode into [`PartKind::Other`], which keeps the raw object so the part
/// re-encodes unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub id: String,
    pub session_id: Option<String>,
    pub message_id: Option<String>,
    pub time: Option<PartTime>,
    pub kind: PartKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartKind {
    Text {
        text: String,
        synthetic: bool,
        ignored: bool,
    },

    Reasoning {
        text: String,
        metadata: Option<Map<String, Value>>,
    },

    ToolCall {
        tool_call_id: Option<String>,
        name: Option<String>,
        /// Serialized tool input
        input: Option<String>,
        status: ToolStatus,
        result: Option<String>,
    },

    ToolResult {
        tool_call_id: Option<String>,
        result: Option<String>,
        is_error: bool,
    },

    Other {
        part_type: String,
        raw: Map<String, Value>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartTime {
    #[serde(deserialize_with = "lenient::int")]
    pub start: i64,

    #[serde(deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl ToolStatus {
    /// Unknown or missing statuses count as completed
    pub fn from_wire(status: Option<&str>) -> Self {
        match status.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("pending") => Self::Pending,
            Some(s) if s.eq_ignore_ascii_case("running") => Self::Running,
            Some(s) if s.eq_ignore_ascii_case("error") => Self::Error,
            _ => Self::Completed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ToolStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ToolStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = lenient::opt_string(deserializer)?;
        Ok(Self::from_wire(value.as_deref()))
    }
}

// Wire shapes, one per known tag. All fields are lenient so decoding an
// object never fails.

#[derive(Default, Deserialize)]
#[serde(default)]
struct Header {
    #[serde(deserialize_with = "lenient::string")]
    id: String,
    #[serde(rename = "sessionID", deserialize_with = "lenient::opt_string")]
    session_id: Option<String>,
    #[serde(rename = "messageID", deserialize_with = "lenient::opt_string")]
    message_id: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient::string")]
    part_type: String,
    #[serde(deserialize_with = "lenient::opt_struct")]
    time: Option<PartTime>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct TextBody {
    #[serde(deserialize_with = "lenient::string")]
    text: String,
    #[serde(deserialize_with = "lenient::flag")]
    synthetic: bool,
    #[serde(deserialize_with = "lenient::flag")]
    ignored: bool,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ReasoningBody {
    #[serde(deserialize_with = "lenient::string")]
    text: String,
    #[serde(deserialize_with = "lenient::opt_object")]
    metadata: Option<Map<String, Value>>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ToolCallBody {
    #[serde(rename = "toolCallID", deserialize_with = "lenient::opt_string")]
    tool_call_id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    input: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    status: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    result: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ToolResultBody {
    #[serde(rename = "toolCallID", deserialize_with = "lenient::opt_string")]
    tool_call_id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    result: Option<String>,
    #[serde(rename = "isError", deserialize_with = "lenient::flag")]
    is_error: bool,
}

fn decode_body<T: DeserializeOwned + Default>(value: &Value) -> T {
    T::deserialize(value).unwrap_or_default()
}

impl Part {
    /// Decode a part from a JSON object; `None` when the value is not an object
    pub fn from_json(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let header: Header = decode_body(&value);

        let kind = match header.part_type.as_str() {
            "text" => {
                let body: TextBody = decode_body(&value);
                PartKind::Text {
                    text: body.text,
                    synthetic: body.synthetic,
                    ignored: body.ignored,
                }
            }
            "reasoning" => {
                let body: ReasoningBody = decode_body(&value);
                PartKind::Reasoning {
                    text: body.text,
                    metadata: body.metadata,
                }
            }
            "tool_call" => {
                let body: ToolCallBody = decode_body(&value);
                PartKind::ToolCall {
                    tool_call_id: body.tool_call_id,
                    name: body.name,
                    input: body.input,
                    status: ToolStatus::from_wire(body.status.as_deref()),
                    result: body.result,
                }
            }
            "tool_result" => {
                let body: ToolResultBody = decode_body(&value);
                PartKind::ToolResult {
                    tool_call_id: body.tool_call_id,
                    result: body.result,
                    is_error: body.is_error,
                }
            }
            _ => {
                let raw = match value {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                PartKind::Other {
                    part_type: header.part_type,
                    raw,
                }
            }
        };

        Some(Self {
            id: header.id,
            session_id: header.session_id,
            message_id: header.message_id,
            time: header.time,
            kind,
        })
    }

    /// Re-encode to the wire shape, `type` tag included
    pub fn to_json(&self) -> Value {
        if let PartKind::Other { part_type, raw } = &self.kind {
            let mut map = raw.clone();
            // A part that arrived untagged stays untagged
            if !part_type.is_empty() {
                map.insert("type".to_string(), Value::String(part_type.clone()));
            }
            return Value::Object(map);
        }

        let mut map = Map::new();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(session_id) = &self.session_id {
            map.insert("sessionID".to_string(), Value::String(session_id.clone()));
        }
        if let Some(message_id) = &self.message_id {
            map.insert("messageID".to_string(), Value::String(message_id.clone()));
        }
        map.insert("type".to_string(), Value::String(self.part_type().to_string()));
        if let Some(time) = &self.time {
            map.insert("time".to_string(), serde_json::json!(time));
        }

        let mut put = |key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };

        match &self.kind {
            PartKind::Text { text, synthetic, ignored } => {
                put("text", Value::String(text.clone()));
                put("synthetic", Value::Bool(*synthetic));
                put("ignored", Value::Bool(*ignored));
            }
            PartKind::Reasoning { text, metadata } => {
                put("text", Value::String(text.clone()));
                if let Some(metadata) = metadata {
                    put("metadata", Value::Object(metadata.clone()));
                }
            }
            PartKind::ToolCall { tool_call_id, name, input, status, result } => {
                if let Some(id) = tool_call_id {
                    put("toolCallID", Value::String(id.clone()));
                }
                if let Some(name) = name {
                    put("name", Value::String(name.clone()));
                }
                if let Some(input) = input {
                    put("input", Value::String(input.clone()));
                }
                put("status", Value::String(status.as_str().to_string()));
                if let Some(result) = result {
                    put("result", Value::String(result.clone()));
                }
            }
            PartKind::ToolResult { tool_call_id, result, is_error } => {
                if let Some(id) = tool_call_id {
                    put("toolCallID", Value::String(id.clone()));
                }
                if let Some(result) = result {
                    put("result", Value::String(result.clone()));
                }
                put("isError", Value::Bool(*is_error));
            }
            PartKind::Other { .. } => {}
        }

        Value::Object(map)
    }

    /// The wire `type` tag
    pub fn part_type(&self) -> &str {
        match &self.kind {
            PartKind::Text { .. } => "text",
            PartKind::Reasoning { .. } => "reasoning",
            PartKind::ToolCall { .. } => "tool_call",
            PartKind::ToolResult { .. } => "tool_result",
            PartKind::Other { part_type, .. } => part_type,
        }
    }

    /// Text content for text and reasoning parts
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            PartKind::Text { text, .. } | PartKind::Reasoning { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self.kind, PartKind::Other { .. })
    }
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(value).ok_or_else(|| serde::de::Error::custom("part must be a JSON object"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_part() {
        let part = Part::from_json(json!({
            "id": "p1",
            "sessionID": "s1",
            "messageID": "m1",
            "type": "text",
            "text": "hello",
            "synthetic": true,
            "time": {"start": 5, "end": 9}
        }))
        .unwrap();

        assert_eq!(part.id, "p1");
        assert_eq!(part.session_id.as_deref(), Some("s1"));
        assert_eq!(part.time, Some(PartTime { start: 5, end: Some(9) }));
        assert_eq!(
            part.kind,
            PartKind::Text {
                text: "hello".to_string(),
                synthetic: true,
                ignored: false
            }
        );
    }

    #[test]
    fn test_tool_call_input_object_is_serialized() {
        let part = Part::from_json(json!({
            "id": "p2",
            "type": "tool_call",
            "name": "bash",
            "input": {"command": "ls"},
            "status": "running"
        }))
        .unwrap();

        match part.kind {
            PartKind::ToolCall { input, status, name, .. } => {
                assert_eq!(input.as_deref(), Some(r#"{"command":"ls"}"#));
                assert_eq!(status, ToolStatus::Running);
                assert_eq!(name.as_deref(), Some("bash"));
            }
            other => panic!("Expected ToolCall, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_status_unknown_maps_to_completed() {
        assert_eq!(ToolStatus::from_wire(Some("queued")), ToolStatus::Completed);
        assert_eq!(ToolStatus::from_wire(None), ToolStatus::Completed);
        assert_eq!(ToolStatus::from_wire(Some("ERROR")), ToolStatus::Error);
        assert!(!ToolStatus::Pending.is_finished());
    }

    #[test]
    fn test_unknown_type_preserves_raw() {
        let original = json!({
            "id": "p3",
            "type": "step-start",
            "snapshot": "abc123",
            "nested": {"k": [1, 2]}
        });
        let part = Part::from_json(original.clone()).unwrap();

        assert_eq!(part.part_type(), "step-start");
        assert!(!part.is_known());
        assert_eq!(part.to_json(), original);
    }

    #[test]
    fn test_missing_type_is_other() {
        let original = json!({"id": "p4", "payload": [1, 2]});
        let part = Part::from_json(original.clone()).unwrap();
        assert_eq!(part.part_type(), "");
        assert_eq!(part.to_json(), original);

        let blank = json!({"id": "p5", "type": ""});
        assert_eq!(Part::from_json(blank.clone()).unwrap().to_json(), blank);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(Part::from_json(json!("text")).is_none());
        assert!(serde_json::from_value::<Part>(json!(3)).is_err());
    }
}
