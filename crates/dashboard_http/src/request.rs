use anyhow::Context;
use bytes::Bytes;
use derive_setters::Setters;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use url::Url;

/// A request that can be sent more than once.
///
/// The body is held as [`Bytes`], so every resend reads the full payload
/// from the start without copying it.
#[derive(Debug, Clone, Setters)]
#[setters(into, strip_option)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Serializes `body` as the JSON payload of the request.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> anyhow::Result<Self> {
        let body = serde_json::to_vec(body).context("Failed to serialize request body")?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// A fresh handle on the body for a resend.
    pub fn replayable_body(&self) -> Option<Bytes> {
        self.body.clone()
    }

    /// A copy of this request ready to be sent again.
    pub fn replay(&self) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.replayable_body(),
        }
    }
}
