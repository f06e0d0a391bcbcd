//! HTTP transport seam
//!
//! The retry state machine in [`crate::CompletionClient`] only sees
//! [`HttpRequest`]/[`HttpResponse`], so tests can script responses without a
//! socket. [`ReqwestTransport`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use specflow_utils::error::LlmError;
use specflow_utils::redaction::redact_error_message;

use crate::stream::{ChunkSource, StreamHandle};

/// Default connect timeout (30 seconds)
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully assembled request. Built fresh for every attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn post(url: impl Into<String>, body: String) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Header value by case-insensitive name
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response body: eagerly read text, or an unread event stream.
#[derive(Debug)]
pub enum ResponseBody {
    Text(String),
    Stream(StreamHandle),
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: ResponseBody::Text(body.into()),
        }
    }

    #[must_use]
    pub fn stream(status: u16, handle: StreamHandle) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "text/event-stream".to_string())],
            body: ResponseBody::Stream(handle),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Header value by case-insensitive name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Read the whole body as text, draining a stream if necessary.
    ///
    /// # Errors
    ///
    /// Propagates stream read failures.
    pub async fn into_text(self) -> Result<String, LlmError> {
        match self.body {
            ResponseBody::Text(text) => Ok(text),
            ResponseBody::Stream(handle) => {
                let bytes = handle.collect_bytes().await?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Executes one HTTP exchange. Implementations must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns `LlmError::Network` when no response was received.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, LlmError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, LlmError> {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| {
                LlmError::Misconfiguration(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, LlmError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            LlmError::Network(format!("request failed: {}", redact_error_message(&e.to_string())))
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let is_event_stream = find_header(&headers, "content-type")
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/event-stream"));

        debug!(status, streaming = is_event_stream, "HTTP response received");

        let body = if is_event_stream {
            ResponseBody::Stream(StreamHandle::new(Box::new(ReqwestChunks(response))))
        } else {
            let text = response.text().await.map_err(|e| {
                LlmError::Network(format!(
                    "failed to read response body: {}",
                    redact_error_message(&e.to_string())
                ))
            })?;
            ResponseBody::Text(text)
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

struct ReqwestChunks(reqwest::Response);

#[async_trait]
impl ChunkSource for ReqwestChunks {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, LlmError> {
        self.0
            .chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|e| LlmError::Stream(redact_error_message(&e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse::text(429, "{}").with_header("Retry-After", "2");
        assert_eq!(response.header("retry-after"), Some("2"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn test_post_sets_json_content_type() {
        let request = HttpRequest::post("http://localhost/x", "{}".into())
            .header("Authorization", "Bearer k");
        assert_eq!(request.header_value("content-type"), Some("application/json"));
        assert_eq!(request.header_value("authorization"), Some("Bearer k"));
    }

    #[tokio::test]
    async fn test_stream_body_drains_to_text() {
        let response = HttpResponse::stream(200, StreamHandle::from_chunks(["a", "b"]));
        assert!(response.is_success());
        assert_eq!(response.into_text().await.unwrap(), "ab");
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());
    }
}
