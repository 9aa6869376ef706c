// HTTP plumbing shared by the facade: one request per call, JSON in and out

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::Value;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Bound on establishing a TCP connection, for both requests and the event stream
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport for `base_url`; trailing slashes are dropped
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let base_url = validate_base_url(&base_url.into())?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // No client-wide timeout: it would also cut the long-lived event stream
        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Underlying client, shared with the event stream
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.execute(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.execute(Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.execute(Method::DELETE, path, None).await
    }

    async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!(method = %method, url = %url, "Sending request");

        let mut request = self
            .http_client
            .request(method.clone(), &url)
            .timeout(self.request_timeout);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(method = %method, url = %url, error = %e, "Request failed");
            ClientError::Request(e)
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(
                method = %method,
                url = %url,
                status = status.as_u16(),
                "Server returned error status"
            );
            return Err(ClientError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(parse_body(&text))
    }
}

/// Response body as JSON; empty or unparsable bodies become `{}`
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(text).unwrap_or_else(|e| {
        tracing::debug!("Response body is not JSON ({}), treating as empty", e);
        Value::Object(Default::default())
    })
}

/// Percent-encode a single path segment such as a session id
pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

pub(crate) fn validate_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::InvalidConfiguration(
            "base URL is empty".to_string(),
        ));
    }

    let parsed = Url::parse(trimmed).map_err(|e| {
        ClientError::InvalidConfiguration(format!("invalid base URL '{}': {}", raw, e))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ClientError::InvalidConfiguration(format!(
            "base URL '{}' must be an http(s) address",
            raw
        )));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), json!({}));
        assert_eq!(parse_body("  \n"), json!({}));
        assert_eq!(parse_body("<html>oops</html>"), json!({}));
        assert_eq!(parse_body("true"), json!(true));
        assert_eq!(parse_body(r#"[{"id":"s1"}]"#), json!([{"id": "s1"}]));
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("ses_123"), "ses_123");
        assert_eq!(encode_segment("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn test_base_url_validation() {
        let transport = HttpTransport::new("http://localhost:4096/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:4096");
        assert_eq!(transport.url("/session"), "http://localhost:4096/session");

        for bad in ["", "not a url", "ftp://host", "http://"] {
            let err = HttpTransport::new(bad, Duration::from_secs(1)).unwrap_err();
            assert!(
                matches!(err, ClientError::InvalidConfiguration(_)),
                "expected invalid configuration for {:?}",
                bad
            );
        }
    }
}
