//! Errors returned by the request executor

use http::StatusCode;
use thiserror::Error;

/// Why an execution did not produce a successful response
#[derive(Error, Debug)]
pub enum Error {
    /// The backend answered with a retryable error status
    #[error("received status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The backend answered with a status that backoff cannot fix
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),

    /// The operation yielded neither a response nor an error
    #[error("operation returned no response and no error")]
    NoResponse,

    /// Every attempt failed
    #[error("after {attempts} retries, last error: {source}")]
    Exhausted {
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    /// The caller cancelled the execution; `attempts` counts operations
    /// already started, including one cut off in flight
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: usize },

    /// The successful response carried a body that could not be decoded
    #[error("failed to decode response body: {0}")]
    InvalidBody(#[source] anyhow::Error),
}

impl Error {
    pub fn exhausted(attempts: usize, last: Error) -> Self {
        Self::Exhausted { attempts, source: Box::new(last) }
    }

    /// Status of the response that caused the error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } | Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Exhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Captured response body of the failure, if any
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } | Self::UnexpectedStatus { body, .. } => Some(body),
            Self::Exhausted { source, .. } => source.body(),
            _ => None,
        }
    }

    /// True when the executor gave up after spending its whole budget, as
    /// opposed to failing on the spot.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}
