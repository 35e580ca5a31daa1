use anyhow::Context;
use dashboard_config::HttpConfig;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use tracing::debug;

use crate::{ApiRequest, ApiResponse};

/// Sends one request and returns whatever came back.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: ApiRequest) -> anyhow::Result<ApiResponse>;
}

/// [`Transport`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn sanitize_headers(headers: &HeaderMap) -> HeaderMap {
        let sensitive_headers = [AUTHORIZATION.as_str(), "x-cisco-meraki-api-key"];
        headers
            .iter()
            .map(|(name, value)| {
                let name_str = name.as_str().to_lowercase();
                let value_str = if sensitive_headers.contains(&name_str.as_str()) {
                    HeaderValue::from_static("[REDACTED]")
                } else {
                    value.clone()
                };
                (name.clone(), value_str)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> anyhow::Result<ApiResponse> {
        debug!(
            method = %request.method,
            url = %request.url,
            headers = ?Self::sanitize_headers(&request.headers),
            "Sending request"
        );

        let ApiRequest { method, url, headers, body } = request;
        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        Ok(builder.send().await?.into())
    }
}

/// True when `error` is a request that ran out of time.
pub fn is_timeout(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<reqwest::Error>()
        .is_some_and(|error| error.is_timeout())
}
