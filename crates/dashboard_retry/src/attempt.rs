use bytes::Bytes;
use http::StatusCode;
use tracing::trace;

/// A response whose status can be inspected and whose body can be read to
/// completion.
///
/// `drain` must leave the underlying connection free for reuse. Calling it
/// again returns the text captured by the first call.
#[async_trait::async_trait]
pub trait DrainBody: Send {
    fn status(&self) -> StatusCode;

    async fn drain(&mut self) -> anyhow::Result<String>;
}

#[async_trait::async_trait]
impl DrainBody for http::Response<Bytes> {
    fn status(&self) -> StatusCode {
        http::Response::status(self)
    }

    async fn drain(&mut self) -> anyhow::Result<String> {
        Ok(String::from_utf8_lossy(self.body()).into_owned())
    }
}

/// What a single invocation of an operation produced.
#[derive(Debug)]
pub struct Attempt<T, R> {
    pub value: Option<T>,
    pub response: Option<R>,
    pub error: Option<anyhow::Error>,
}

impl<T, R> Attempt<T, R> {
    pub fn new(value: Option<T>, response: Option<R>, error: Option<anyhow::Error>) -> Self {
        Self { value, response, error }
    }

    pub fn success(value: T, response: R) -> Self {
        Self::new(Some(value), Some(response), None)
    }

    /// A response came back but the call failed, e.g. an error status
    pub fn failure(response: R, error: impl Into<anyhow::Error>) -> Self {
        Self::new(None, Some(response), Some(error.into()))
    }

    /// No response was received at all
    pub fn network(error: impl Into<anyhow::Error>) -> Self {
        Self::new(None, None, Some(error.into()))
    }
}

impl<R> Attempt<(), R> {
    /// Maps the result of sending a request onto an attempt without a
    /// decoded value.
    pub fn from_result(result: anyhow::Result<R>) -> Self {
        match result {
            Ok(response) => Self::new(Some(()), Some(response), None),
            Err(error) => Self::network(error),
        }
    }
}

/// Classification of an attempt.
#[derive(Debug)]
pub enum Outcome {
    /// 2xx response
    Success,
    /// 4xx or 5xx response worth another attempt
    Retryable { status: StatusCode, body: String },
    /// Any other status, or a terminal error status
    Fatal { status: StatusCode, body: String },
    /// No response, only an error
    Network(anyhow::Error),
    /// Neither a response nor an error
    Empty,
}

impl Outcome {
    /// Classifies an attempt, draining the body of every non-success
    /// response. `is_terminal` marks error statuses that must not be retried.
    pub async fn classify<R, F>(
        response: Option<&mut R>,
        error: Option<anyhow::Error>,
        is_terminal: F,
    ) -> Self
    where
        R: DrainBody,
        F: Fn(StatusCode) -> bool,
    {
        match (response, error) {
            (Some(response), _) if response.status().is_success() => Outcome::Success,
            (Some(response), error) => {
                let status = response.status();
                let body = match response.drain().await {
                    Ok(body) => body,
                    Err(drain_error) => {
                        trace!(error = ?drain_error, %status, "Failed to read response body");
                        String::new()
                    }
                };
                let body = match error {
                    Some(error) if body.is_empty() => error.to_string(),
                    _ => body,
                };

                if is_retryable_status(status) && !is_terminal(status) {
                    Outcome::Retryable { status, body }
                } else {
                    Outcome::Fatal { status, body }
                }
            }
            (None, Some(error)) => Outcome::Network(error),
            (None, None) => Outcome::Empty,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Outcome::Retryable { .. } | Outcome::Network(_) | Outcome::Empty
        )
    }
}

/// Client and server errors are worth another attempt against a congested
/// backend.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

/// Truncates `body` to at most `max` characters for logging.
pub fn snippet(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((index, _)) => format!("{}...", &body[..index]),
        None => body.to_string(),
    }
}
