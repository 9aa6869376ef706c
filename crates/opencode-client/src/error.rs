use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Base URL (or a URL derived from it) could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transient event stream failure, drives reconnect
    #[error("Event stream disconnected: {0}")]
    StreamDisconnected(String),

    #[error("Preference store error: {0}")]
    Preferences(String),
}

impl ClientError {
    /// HTTP status code, when the failure came from the server
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::StreamDisconnected(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = ClientError::Http {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404: not found");
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = ClientError::Http {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
        assert!(!ClientError::InvalidConfiguration("bad".into()).is_transient());
    }
}
