use std::time::Duration;

use dashboard_config::TransportRetryConfig;
use dashboard_retry::Error;
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{ApiRequest, ApiResponse, Transport, is_timeout};

/// Resends failed requests at the transport level.
///
/// Unlike the executor in `dashboard_retry`, which retries on the response
/// status whatever the method, this client decides by method: only safe
/// methods are resent unless `retry_all_methods` is enabled. A request is
/// retried when it fails to produce a response or the response is not 2xx.
pub struct RetryingClient<T> {
    transport: T,
    config: TransportRetryConfig,
    cancel: CancellationToken,
}

impl<T: Transport> RetryingClient<T> {
    pub fn new(transport: T, config: TransportRetryConfig) -> Self {
        Self { transport, config, cancel: CancellationToken::new() }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &TransportRetryConfig {
        &self.config
    }

    /// Whether a failed request with this method may be sent again.
    pub fn retries(&self, method: &Method) -> bool {
        self.config.retry_all_methods || method.is_safe()
    }

    /// Sends `request`, retrying per the transport policy. After the last
    /// attempt the final response or error is returned unchanged.
    pub async fn send(&self, request: ApiRequest) -> anyhow::Result<ApiResponse> {
        let total = if self.retries(&request.method) {
            self.config.total_attempts()
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            if attempt > 1 && request.body.is_some() {
                debug!(attempt, "Rewinding request body");
            }

            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled { attempts: attempt - 1 }.into());
            }
            let mut result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(Error::Cancelled { attempts: attempt }.into());
                }
                result = self.transport.send(request.replay()) => result,
            };

            let wait = match &result {
                Ok(response) if response.status().is_success() => None,
                Ok(response) => {
                    warn!(
                        attempt,
                        total,
                        method = %request.method,
                        url = %request.url,
                        status = %response.status(),
                        "Request failed"
                    );
                    Some(self.wait_after(response))
                }
                Err(error) if is_timeout(error) => {
                    warn!(attempt, total, method = %request.method, url = %request.url, %error, "Request timed out");
                    Some(Duration::ZERO)
                }
                Err(error) => {
                    warn!(attempt, total, method = %request.method, url = %request.url, %error, "Request failed");
                    Some(Duration::ZERO)
                }
            };

            let Some(wait) = wait else {
                return result;
            };
            if attempt >= total {
                return result;
            }

            // Free the connection before resending
            if let Ok(response) = result.as_mut()
                && let Err(error) = response.bytes().await
            {
                trace!(error = ?error, "Failed to drain response body");
            }

            let delay = wait + self.config.pause();
            debug!(attempt, ?delay, "Waiting before resending request");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(Error::Cancelled { attempts: attempt }.into());
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Rate-limited responses carry their own backoff through `Retry-After`
    /// and skip the configured delay.
    fn wait_after(&self, response: &ApiResponse) -> Duration {
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            response
                .retry_after()
                .map(|delay| delay.min(self.config.max_retry_after()))
                .unwrap_or_default()
        } else {
            self.config.delay()
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use tokio::time::Instant;
    use url::Url;

    use super::*;
    use crate::ReqwestTransport;
    use crate::test_utils::{MockTransport, Scripted};

    fn config() -> TransportRetryConfig {
        TransportRetryConfig::default()
            .max_retries(2usize)
            .delay_ms(10_000u64)
            .pause_ms(1000u64)
    }

    fn request(method: Method) -> ApiRequest {
        let url = Url::parse("https://api.example.com/api/v1/networks/N_1").unwrap();
        ApiRequest::new(method, url)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_is_retried_until_exhausted() {
        let fixture = RetryingClient::new(MockTransport::statuses(&[500]), config());

        let actual = fixture.send(request(Method::GET)).await.unwrap();

        assert_eq!(fixture.transport().calls(), 3);
        assert_eq!(actual.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_stops_on_success() {
        let fixture = RetryingClient::new(MockTransport::statuses(&[503, 200]), config());

        let actual = fixture.send(request(Method::GET)).await.unwrap();

        assert_eq!(fixture.transport().calls(), 2);
        assert_eq!(actual.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_are_not_retried_by_default() {
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let fixture = RetryingClient::new(MockTransport::statuses(&[500]), config());

            let actual = fixture.send(request(method.clone())).await.unwrap();

            assert_eq!(fixture.transport().calls(), 1, "{method}");
            assert_eq!(actual.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_error_is_returned_immediately() {
        let fixture = RetryingClient::new(MockTransport::new([Scripted::Error("reset")]), config());

        let actual = fixture.send(request(Method::POST)).await;

        assert_eq!(fixture.transport().calls(), 1);
        assert_eq!(actual.unwrap_err().to_string(), "reset");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_all_methods_rewinds_body() {
        let fixture = RetryingClient::new(
            MockTransport::statuses(&[500, 502, 201]),
            config().retry_all_methods(true),
        );
        let body = Bytes::from_static(br#"{"name":"branch"}"#);

        let actual = fixture
            .send(request(Method::POST).body(body.clone()))
            .await
            .unwrap();

        assert_eq!(actual.status(), StatusCode::CREATED);
        let bodies: Vec<_> = fixture
            .transport()
            .requests()
            .into_iter()
            .map(|request| request.body)
            .collect();
        let expected = vec![Some(body.clone()), Some(body.clone()), Some(body)];
        assert_eq!(bodies, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_all_methods_matches_get_attempts() {
        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let fixture = RetryingClient::new(
                MockTransport::statuses(&[500]),
                config().retry_all_methods(true),
            );

            fixture.send(request(method.clone())).await.unwrap();

            assert_eq!(fixture.transport().calls(), 3, "{method}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_retried_and_last_error_returned() {
        let fixture = RetryingClient::new(
            MockTransport::new([Scripted::Error("first"), Scripted::Error("last")]),
            config(),
        );

        let actual = fixture.send(request(Method::GET)).await;

        assert_eq!(fixture.transport().calls(), 3);
        assert_eq!(actual.unwrap_err().to_string(), "last");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_waits_delay_and_pause() {
        let fixture = RetryingClient::new(MockTransport::statuses(&[500, 200]), config());
        let start = Instant::now();

        fixture.send(request(Method::GET)).await.unwrap();

        let actual = start.elapsed();
        assert!(actual >= Duration::from_secs(11) && actual < Duration::from_secs(12), "{actual:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_skips_delay() {
        let fixture = RetryingClient::new(MockTransport::statuses(&[429, 200]), config());
        let start = Instant::now();

        fixture.send(request(Method::GET)).await.unwrap();

        let actual = start.elapsed();
        assert!(actual >= Duration::from_secs(1) && actual < Duration::from_secs(2), "{actual:?}");
    }

    #[test]
    fn test_rate_limited_honours_capped_retry_after() {
        let fixture = RetryingClient::new(
            MockTransport::statuses(&[429]),
            config().max_retry_after_secs(5u64),
        );
        let response = |seconds: &'static str| {
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, HeaderValue::from_static(seconds));
            ApiResponse::new(StatusCode::TOO_MANY_REQUESTS, "").with_headers(headers)
        };

        assert_eq!(fixture.wait_after(&response("3")), Duration::from_secs(3));
        assert_eq!(fixture.wait_after(&response("120")), Duration::from_secs(5));
        assert_eq!(
            fixture.wait_after(&ApiResponse::new(StatusCode::BAD_GATEWAY, "")),
            Duration::from_secs(10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_pause() {
        let cancel = CancellationToken::new();
        let fixture = RetryingClient::new(MockTransport::statuses(&[500]), config())
            .with_cancellation(cancel.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        let actual = fixture.send(request(Method::GET)).await;
        canceller.await.unwrap();

        assert_eq!(fixture.transport().calls(), 1);
        let error = actual.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::Cancelled { attempts: 1 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_sends_nothing() {
        let fixture = RetryingClient::new(MockTransport::statuses(&[200]), config());
        fixture.cancel.cancel();

        let actual = fixture.send(request(Method::GET)).await;

        assert_eq!(fixture.transport().calls(), 0);
        assert!(matches!(
            actual.unwrap_err().downcast_ref::<Error>(),
            Some(Error::Cancelled { attempts: 0 })
        ));
    }

    #[tokio::test]
    async fn test_timed_out_request_is_retried() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let fixture = RetryingClient::new(
            ReqwestTransport::from_client(client),
            TransportRetryConfig::default()
                .max_retries(2usize)
                .delay_ms(0u64)
                .pause_ms(0u64),
        );
        let url = Url::parse(&format!("http://{address}/api/v1/networks")).unwrap();
        let start = Instant::now();

        let actual = fixture.send(ApiRequest::get(url)).await;
        server.abort();

        let error = actual.unwrap_err();
        assert!(is_timeout(&error), "{error:#}");
        // Three attempts of 50ms each
        assert!(start.elapsed() >= Duration::from_millis(150), "{:?}", start.elapsed());
    }
}
