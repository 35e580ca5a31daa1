use anyhow::Context;
use dashboard_config::Environment;
use dashboard_retry::{Attempt, Diagnostics, Error, Execution, RetryExecutor, snippet};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{ApiRequest, ApiResponse, ReqwestTransport, RetryingClient, Transport};

/// Client for the dashboard REST API.
///
/// Every call goes through two layers: the [`RetryExecutor`] retries on the
/// response status, and each of its attempts is sent through a
/// [`RetryingClient`] that may resend safe requests on its own.
pub struct DashboardClient<T> {
    http: RetryingClient<T>,
    executor: RetryExecutor,
    base_url: Url,
}

impl DashboardClient<ReqwestTransport> {
    pub fn from_env(env: &Environment) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(&env.http)?;
        Ok(Self::new(
            RetryingClient::new(transport, env.transport.clone()),
            RetryExecutor::new(env.retry.clone()),
            env.base_url.clone(),
        ))
    }
}

impl<T: Transport> DashboardClient<T> {
    pub fn new(http: RetryingClient<T>, executor: RetryExecutor, base_url: Url) -> Self {
        Self { http, executor, base_url }
    }

    /// Shares one cancellation token between both retry layers.
    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        Self {
            http: self.http.with_cancellation(cancel.clone()),
            executor: self.executor.with_cancellation(cancel),
            base_url: self.base_url,
        }
    }

    pub fn http(&self) -> &RetryingClient<T> {
        &self.http
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Resolves an API path against the base URL.
    pub fn url(&self, path: &str) -> anyhow::Result<Url> {
        if path.contains("://") || path.contains("..") {
            anyhow::bail!("Invalid path: Contains forbidden patterns");
        }

        // Remove leading slash to avoid discarding the base path
        let path = path.trim_start_matches('/');

        self.base_url
            .join(path)
            .with_context(|| format!("Failed to append {path} to base URL: {}", self.base_url))
    }

    pub fn request(&self, method: Method, path: &str) -> anyhow::Result<ApiRequest> {
        Ok(ApiRequest::new(method, self.url(path)?))
    }

    /// Sends `request` with retries and decodes the JSON body of the
    /// successful response.
    pub async fn call<O: DeserializeOwned>(&self, request: ApiRequest) -> Execution<O, ApiResponse> {
        let execution = self
            .executor
            .execute(|| {
                let request = request.replay();
                async move { Attempt::from_result(self.http.send(request).await) }
            })
            .await;

        decode(execution).await
    }

    /// Like [`DashboardClient::call`], also recording a warning for every
    /// failed attempt.
    ///
    /// Delays follow `RetryConfig::backoff` like every other call. Build the
    /// executor from [`dashboard_config::RetryConfig::exponential`] for
    /// delays that double from the base delay after each failure.
    pub async fn call_with_diagnostics<O: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Execution<O, ApiResponse> {
        let snippet_len = self.executor.config().body_snippet_len;
        let mut attempt = 0;

        let execution = self
            .executor
            .execute_with_diagnostics(|| {
                attempt += 1;
                let attempt = attempt;
                let request = request.replay();
                async move {
                    let mut diagnostics = Diagnostics::new();
                    let mut result = self.http.send(request).await;
                    match &mut result {
                        Ok(response) if !response.status().is_success() => {
                            let status = response.status();
                            let body = response.text().await.unwrap_or_default();
                            diagnostics.warning(
                                format!("API request attempt {attempt} failed with status {status}"),
                                snippet(&body, snippet_len),
                            );
                        }
                        Err(error) => diagnostics.warning(
                            format!("API request attempt {attempt} failed"),
                            format!("{error:#}"),
                        ),
                        Ok(_) => {}
                    }
                    (Attempt::from_result(result), diagnostics)
                }
            })
            .await;

        decode(execution).await
    }
}

async fn decode<O: DeserializeOwned>(
    execution: Execution<(), ApiResponse>,
) -> Execution<O, ApiResponse> {
    let Execution { mut response, error, attempts, diagnostics, .. } = execution;

    let (value, error) = match (error, response.as_mut()) {
        (None, Some(response)) => match response.json::<O>().await {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(Error::InvalidBody(error))),
        },
        (error, _) => (None, error),
    };

    Execution { value, response, error, attempts, diagnostics }
}
