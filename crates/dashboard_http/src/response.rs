use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use dashboard_retry::DrainBody;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;

#[derive(Debug)]
enum Body {
    Pending(reqwest::Response),
    Captured(Bytes),
}

/// Response from the dashboard API.
///
/// The body stays on the wire until it is first read; after that it is held
/// in memory and every reader sees the same bytes.
#[derive(Debug)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl From<reqwest::Response> for ApiResponse {
    fn from(response: reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: Body::Pending(response),
        }
    }
}

impl ApiResponse {
    /// A response whose body is already in memory.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self { status, headers: HeaderMap::new(), body: Body::Captured(body.into()) }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Reads the body to completion, releasing the connection.
    pub async fn bytes(&mut self) -> anyhow::Result<Bytes> {
        let body = std::mem::replace(&mut self.body, Body::Captured(Bytes::new()));
        let bytes = match body {
            Body::Captured(bytes) => bytes,
            Body::Pending(response) => response
                .bytes()
                .await
                .with_context(|| format!("Failed to read body of {} response", self.status))?,
        };
        self.body = Body::Captured(bytes.clone());
        Ok(bytes)
    }

    pub async fn text(&mut self) -> anyhow::Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decodes the body as JSON. An empty body decodes as `null`.
    pub async fn json<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let bytes = self.bytes().await?;
        let payload: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(payload)
            .with_context(|| format!("Failed to decode {} response as JSON", self.status))
    }

    /// Delay requested by the server through `Retry-After`, when given in
    /// seconds.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

#[async_trait::async_trait]
impl DrainBody for ApiResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    async fn drain(&mut self) -> anyhow::Result<String> {
        self.text().await
    }
}
