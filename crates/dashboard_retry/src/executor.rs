use std::future::Future;

use dashboard_config::RetryConfig;
use http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{Attempt, Backoff, Diagnostics, DrainBody, Error, Outcome, snippet};

/// Final state of a retried call: the last value, response and error seen,
/// plus everything reported along the way.
#[derive(Debug)]
pub struct Execution<T, R> {
    pub value: Option<T>,
    pub response: Option<R>,
    pub error: Option<Error>,
    /// Number of times the operation was invoked
    pub attempts: usize,
    pub diagnostics: Diagnostics,
}

impl<T, R> Execution<T, R> {
    fn new() -> Self {
        Self {
            value: None,
            response: None,
            error: None,
            attempts: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    fn finish(mut self, value: Option<T>, response: Option<R>, error: Option<Error>) -> Self {
        self.value = value;
        self.response = response;
        self.error = error;
        self
    }

    fn fail(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Splits into the `(value, response, error)` triple.
    pub fn into_parts(self) -> (Option<T>, Option<R>, Option<Error>) {
        (self.value, self.response, self.error)
    }

    pub fn into_result(self) -> Result<Option<T>, Error> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.value),
        }
    }
}

impl<T, R: DrainBody> Execution<T, R> {
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|response| response.status())
    }
}

/// Calls an operation until it yields a 2xx response or the retry budget in
/// [`RetryConfig`] runs out.
///
/// Attempts are strictly sequential. Error statuses in `400..=599` and
/// failures without a response are retried; any other non-2xx status is
/// returned on the spot. Cancelling the token aborts both the in-flight call
/// and a pending delay.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    cancel: CancellationToken,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, cancel: CancellationToken::new() }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs `operation` with retries.
    pub async fn execute<T, R, F, Fut>(&self, mut operation: F) -> Execution<T, R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T, R>>,
        R: DrainBody,
    {
        self.run(|| {
            let attempt = operation();
            async move { (attempt.await, Diagnostics::new()) }
        })
        .await
    }

    /// Runs `operation` with retries, appending the diagnostics of every
    /// attempt to the returned execution.
    pub async fn execute_with_diagnostics<T, R, F, Fut>(&self, operation: F) -> Execution<T, R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = (Attempt<T, R>, Diagnostics)>,
        R: DrainBody,
    {
        self.run(operation).await
    }

    async fn run<T, R, F, Fut>(&self, mut operation: F) -> Execution<T, R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = (Attempt<T, R>, Diagnostics)>,
        R: DrainBody,
    {
        let total = self.config.total_attempts();
        let snippet_len = self.config.body_snippet_len;
        let mut backoff = Backoff::from_config(&self.config);
        let mut execution = Execution::new();
        let mut last_error = Error::NoResponse;

        for attempt in 1..=total {
            if self.cancel.is_cancelled() {
                warn!(attempt, "API request cancelled before it was sent");
                return execution.fail(Error::Cancelled { attempts: attempt - 1 });
            }
            info!(attempt, total, "Executing API request");

            let call = operation();
            execution.attempts = attempt;
            let (Attempt { value, mut response, error }, diagnostics) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(attempt, "API request cancelled");
                    return execution.fail(Error::Cancelled { attempts: attempt });
                }
                result = call => result,
            };
            execution.diagnostics.extend(diagnostics);

            let outcome = Outcome::classify(response.as_mut(), error, |status| {
                self.config.is_terminal_status(status.as_u16())
            })
            .await;

            match outcome {
                Outcome::Success => {
                    debug!(attempt, "API request succeeded");
                    return execution.finish(value, response, None);
                }
                Outcome::Fatal { status, body } => {
                    warn!(
                        attempt,
                        %status,
                        body = %snippet(&body, snippet_len),
                        "Non-retryable response from API"
                    );
                    return execution.finish(
                        value,
                        response,
                        Some(Error::UnexpectedStatus { status, body }),
                    );
                }
                Outcome::Retryable { status, body } => {
                    warn!(
                        attempt,
                        total,
                        %status,
                        body = %snippet(&body, snippet_len),
                        "Retrying API request after error response"
                    );
                    last_error = Error::Status { status, body };
                }
                Outcome::Network(error) => {
                    warn!(attempt, total, %error, "Retrying API request after transport failure");
                    trace!(error = ?error, "Transport failure");
                    last_error = Error::Transport(error);
                }
                Outcome::Empty => {
                    warn!(attempt, total, "Operation returned no response or no error");
                    last_error = Error::NoResponse;
                }
            }
            execution.value = value;
            execution.response = response;

            if attempt < total {
                let delay = backoff.next_delay();
                debug!(attempt, ?delay, "Waiting before next attempt");
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        warn!(attempt, "API request cancelled while waiting to retry");
                        return execution.fail(Error::Cancelled { attempts: attempt });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        warn!(attempts = total, error = %last_error, "Retry budget exhausted");
        execution.fail(Error::exhausted(total, last_error))
    }
}
