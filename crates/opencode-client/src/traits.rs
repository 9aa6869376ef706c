use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::types::{Health, Message, ModelSelection, PathInfo, Project, ProvidersResponse, Session};

/// Request/response operations of an OpenCode server
///
/// Streaming output is not returned from these calls: prompts are
/// acknowledged immediately and their output arrives on the event stream.
#[async_trait]
pub trait OpenCodeApi: Send + Sync {
    /// `GET /global/health`
    async fn health_check(&self) -> Result<Health>;

    /// Current project, or `None` if it could not be fetched
    async fn get_current_project(&self) -> Option<Project>;

    /// Server paths, or `None` if they could not be fetched
    async fn get_path_info(&self) -> Option<PathInfo>;

    async fn list_sessions(&self) -> Result<Vec<Session>>;

    async fn create_session(&self, title: Option<&str>) -> Result<Session>;

    /// Whether the server confirmed the deletion
    async fn delete_session(&self, session_id: &str) -> Result<bool>;

    async fn get_session_messages(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Run the server's session initialisation with the given model
    async fn init_session(
        &self,
        session_id: &str,
        provider_id: &str,
        model_id: &str,
        message_id: &str,
    ) -> Result<bool>;

    async fn get_providers(&self) -> Result<ProvidersResponse>;

    /// Submit a prompt without waiting for the reply
    ///
    /// Returns the message id used, which correlates the deltas that follow.
    async fn send_message_async(&self, session_id: &str, request: PromptRequest)
        -> Result<String>;
}

/// A text prompt for `POST /session/{id}/prompt_async`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub text: String,
    pub model: Option<ModelSelection>,
    /// Generated when not set
    pub message_id: Option<String>,
}

impl PromptRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            message_id: None,
        }
    }

    pub fn with_model(self, provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        self.with_selection(ModelSelection::new(provider_id, model_id))
    }

    pub fn with_selection(mut self, selection: ModelSelection) -> Self {
        self.model = Some(selection);
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Request body; `model` is included only when both ids are present
    pub fn to_body(&self, message_id: &str) -> Value {
        let mut body = json!({
            "parts": [{"type": "text", "text": self.text}],
            "messageID": message_id,
        });

        if let Some(model) = self
            .model
            .as_ref()
            .filter(|m| !m.provider_id.is_empty() && !m.model_id.is_empty())
        {
            body["model"] = json!({
                "providerID": model.provider_id,
                "modelID": model.model_id,
            });
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_body_with_model() {
        let request = PromptRequest::new("hi").with_model("anthropic", "claude");
        assert_eq!(
            request.to_body("m1"),
            json!({
                "parts": [{"type": "text", "text": "hi"}],
                "messageID": "m1",
                "model": {"providerID": "anthropic", "modelID": "claude"}
            })
        );
    }

    #[test]
    fn test_prompt_body_skips_partial_model() {
        let request = PromptRequest::new("hi").with_model("anthropic", "");
        let body = request.to_body("m1");
        assert!(body.get("model").is_none());
        assert_eq!(body["parts"][0]["type"], "text");
    }
}
