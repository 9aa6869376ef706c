use std::collections::HashMap;

use crate::streaming::StreamEvent;

/// Outcome of feeding one event to a [`StreamAccumulator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorUpdate {
    /// A delta was appended; `text` is the message text so far
    Updated { message_id: String, text: String },

    /// The session went idle; carries the pending message, if one was open
    Completed {
        message_id: Option<String>,
        text: Option<String>,
    },

    Failed { message: String },
}

/// Rebuilds streamed assistant text for one session
///
/// Deltas are appended per message id in arrival order. The pending message
/// id, set by [`begin`](Self::begin) after a prompt is sent, is cleared when
/// the session goes idle or reports an error.
#[derive(Debug, Clone)]
pub struct StreamAccumulator {
    session_id: String,
    pending_message_id: Option<String>,
    buffers: HashMap<String, String>,
}

impl StreamAccumulator {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            pending_message_id: None,
            buffers: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn pending_message_id(&self) -> Option<&str> {
        self.pending_message_id.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending_message_id.is_some()
    }

    /// Mark `message_id` as the response being waited for
    pub fn begin(&mut self, message_id: impl Into<String>) {
        let message_id = message_id.into();
        self.buffers.entry(message_id.clone()).or_default();
        self.pending_message_id = Some(message_id);
    }

    /// Apply one event; events for other sessions yield `None`
    pub fn apply(&mut self, event: &StreamEvent) -> Option<AccumulatorUpdate> {
        if event.session_id() != self.session_id {
            return None;
        }

        match event {
            StreamEvent::Delta {
                message_id, delta, ..
            } => {
                let buffer = self.buffers.entry(message_id.clone()).or_default();
                buffer.push_str(delta);
                Some(AccumulatorUpdate::Updated {
                    message_id: message_id.clone(),
                    text: buffer.clone(),
                })
            }
            StreamEvent::Idle { .. } => {
                let message_id = self.pending_message_id.take();
                let text = message_id
                    .as_ref()
                    .and_then(|id| self.buffers.get(id))
                    .cloned();
                Some(AccumulatorUpdate::Completed { message_id, text })
            }
            StreamEvent::Error { message, .. } => {
                self.pending_message_id = None;
                Some(AccumulatorUpdate::Failed {
                    message: message.clone(),
                })
            }
        }
    }

    /// Text received so far for `message_id`
    pub fn text(&self, message_id: &str) -> Option<&str> {
        self.buffers.get(message_id).map(String::as_str)
    }

    /// Forget all buffered text
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.pending_message_id = None;
    }
}
