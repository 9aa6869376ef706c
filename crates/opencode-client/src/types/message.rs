use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::lenient;
use super::part::{Part, PartKind};

/// A message with its ordered parts, as returned by `GET /session/{id}/message`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    #[serde(deserialize_with = "lenient::struct_or_default")]
    pub info: MessageInfo,

    #[serde(deserialize_with = "lenient::list")]
    pub parts: Vec<Part>,
}

impl Message {
    pub fn role(&self) -> &Role {
        &self.info.role
    }

    /// Concatenated text of the visible text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match &part.kind {
                PartKind::Text { text, ignored: false, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageInfo {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,

    #[serde(rename = "sessionID", deserialize_with = "lenient::string")]
    pub session_id: String,

    pub role: Role,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub time: Option<MessageTime>,
}

/// Provider + model pair attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRef {
    #[serde(rename = "providerID", deserialize_with = "lenient::string")]
    pub provider_id: String,

    #[serde(rename = "modelID", deserialize_with = "lenient::string")]
    pub model_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTime {
    #[serde(alias = "created", deserialize_with = "lenient::int")]
    pub start: i64,

    #[serde(
        alias = "completed",
        deserialize_with = "lenient::opt_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<i64>,
}

/// Author of a message; roles other than user/assistant are kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    Other(String),
}

impl Default for Role {
    fn default() -> Self {
        Role::Other(String::new())
    }
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Other(role) => role,
        }
    }
}

impl From<&str> for Role {
    fn from(role: &str) -> Self {
        match role {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let role = lenient::opt_string(deserializer)?;
        Ok(role.as_deref().map(Role::from).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_with_parts() {
        let message: Message = serde_json::from_value(json!({
            "info": {
                "id": "m1",
                "sessionID": "s1",
                "role": "assistant",
                "model": {"providerID": "anthropic", "modelID": "claude"},
                "time": {"created": 100, "completed": 200}
            },
            "parts": [
                {"id": "p1", "type": "text", "text": "Hel"},
                {"id": "p2", "type": "text", "text": "hidden", "ignored": true},
                {"id": "p3", "type": "text", "text": "lo"},
                "garbage"
            ]
        }))
        .unwrap();

        assert_eq!(message.role(), &Role::Assistant);
        assert_eq!(message.parts.len(), 3);
        assert_eq!(message.text(), "Hello");
        assert_eq!(
            message.info.time,
            Some(MessageTime { start: 100, end: Some(200) })
        );
        assert_eq!(message.info.model.unwrap().model_id, "claude");
    }

    #[test]
    fn test_unknown_role_is_preserved() {
        let info: MessageInfo = serde_json::from_value(json!({"role": "system"})).unwrap();
        assert_eq!(info.role, Role::Other("system".to_string()));
        assert_eq!(serde_json::to_value(&info.role).unwrap(), json!("system"));
    }

    #[test]
    fn test_missing_info_defaults() {
        let message: Message = serde_json::from_value(json!({})).unwrap();
        assert_eq!(message.info.id, "");
        assert_eq!(message.info.role, Role::Other(String::new()));
        assert!(message.parts.is_empty());
    }
}
