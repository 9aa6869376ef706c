// OpenCode server client: request/response calls plus the event stream

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::config::{ClientConfig, ReconnectPolicy, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::error::Result;
use crate::event_source::{ConnectionState, EventHandler, EventStreamManager};
use crate::streaming::StreamUpdate;
use crate::traits::{OpenCodeApi, PromptRequest};
use crate::transport::{encode_segment, HttpTransport};
use crate::types::lenient::{decode_list, decode_object, value_to_bool};
use crate::types::{Health, Message, PathInfo, Project, ProvidersResponse, Session};

/// Client for one OpenCode server
///
/// Owns at most one event stream connection; dropping the client closes it.
pub struct OpenCodeClient {
    transport: HttpTransport,
    events: EventStreamManager,
}

impl OpenCodeClient {
    /// Client with default timeout and reconnect policy
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    pub fn builder() -> OpenCodeClientBuilder {
        OpenCodeClientBuilder::default()
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::builder()
            .base_url(config.base_url.clone())
            .request_timeout(config.request_timeout())
            .reconnect_policy(config.reconnect)
            .build()
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn events(&self) -> &EventStreamManager {
        &self.events
    }

    /// Subscribe to server events, replacing any existing subscription
    pub fn connect_event_source<H: EventHandler>(&self, handler: H) -> Result<()> {
        self.events.connect(handler)
    }

    /// Subscribe to server events through a channel
    pub fn connect_event_channel(&self) -> Result<mpsc::UnboundedReceiver<StreamUpdate>> {
        self.events.connect_channel()
    }

    pub fn disconnect_event_source(&self) {
        self.events.disconnect();
    }

    pub fn is_event_source_connected(&self) -> bool {
        self.events.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.events.state()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.events.subscribe_state()
    }

    fn session_path(session_id: &str, suffix: &str) -> String {
        format!("/session/{}{}", encode_segment(session_id), suffix)
    }
}

/// `{success: true}`, a bare `true` or an empty body
fn is_success(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Object(map) => match map.get("success") {
            Some(flag) => value_to_bool(flag).unwrap_or(false),
            None => map.is_empty(),
        },
        _ => false,
    }
}

#[async_trait]
impl OpenCodeApi for OpenCodeClient {
    async fn health_check(&self) -> Result<Health> {
        let response = self.transport.get("/global/health").await?;
        Ok(decode_object(response))
    }

    async fn get_current_project(&self) -> Option<Project> {
        match self.transport.get("/project/current").await {
            Ok(response) => Some(decode_object(response)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch current project");
                None
            }
        }
    }

    async fn get_path_info(&self) -> Option<PathInfo> {
        match self.transport.get("/path").await {
            Ok(response) => Some(decode_object(response)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch path info");
                None
            }
        }
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let response = self.transport.get("/session").await?;
        Ok(decode_list(response))
    }

    async fn create_session(&self, title: Option<&str>) -> Result<Session> {
        let body = match title {
            Some(title) => json!({ "title": title }),
            None => json!({}),
        };
        let response = self.transport.post("/session", &body).await?;
        let session: Session = decode_object(response);
        tracing::info!(session_id = %session.id, "Created session");
        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let response = self
            .transport
            .delete(&Self::session_path(session_id, ""))
            .await?;
        Ok(is_success(&response))
    }

    async fn get_session_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let response = self
            .transport
            .get(&Self::session_path(session_id, "/message"))
            .await?;
        Ok(decode_list(response))
    }

    async fn init_session(
        &self,
        session_id: &str,
        provider_id: &str,
        model_id: &str,
        message_id: &str,
    ) -> Result<bool> {
        let body = json!({
            "providerID": provider_id,
            "modelID": model_id,
            "messageID": message_id,
        });
        let response = self
            .transport
            .post(&Self::session_path(session_id, "/init"), &body)
            .await?;
        Ok(is_success(&response))
    }

    async fn get_providers(&self) -> Result<ProvidersResponse> {
        let response = self.transport.get("/provider").await?;
        Ok(decode_object(response))
    }

    async fn send_message_async(
        &self,
        session_id: &str,
        request: PromptRequest,
    ) -> Result<String> {
        let message_id = request
            .message_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.transport
            .post(
                &Self::session_path(session_id, "/prompt_async"),
                &request.to_body(&message_id),
            )
            .await?;

        tracing::debug!(session_id, message_id = %message_id, "Prompt accepted");
        Ok(message_id)
    }
}

/// Builder for OpenCodeClient
#[derive(Default)]
pub struct OpenCodeClientBuilder {
    base_url: Option<String>,
    request_timeout: Option<Duration>,
    reconnect_policy: Option<ReconnectPolicy>,
}

impl OpenCodeClientBuilder {
    /// Server address, e.g. "http://192.168.1.20:4096"
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<OpenCodeClient> {
        let transport = HttpTransport::new(
            self.base_url.unwrap_or_default(),
            self.request_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
        )?;

        let events = EventStreamManager::new(
            transport.http_client().clone(),
            transport.base_url(),
            self.reconnect_policy.unwrap_or_default(),
        );

        Ok(OpenCodeClient { transport, events })
    }
}
