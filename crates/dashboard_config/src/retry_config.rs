use std::time::Duration;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// How the delay between two attempts is computed.
#[derive(
    Default,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    fake::Dummy,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackoffStrategy {
    /// One random delay in the jitter range, drawn once per call and reused
    /// for every gap.
    #[default]
    FixedJitter,
    /// A fresh random delay in the jitter range for every gap.
    Jitter,
    /// Starts at the base delay and doubles after each failure, capped at the
    /// maximum delay.
    Exponential,
    /// The base delay for every gap.
    Constant,
}

/// Application-level retry policy used by the request executor.
///
/// `max_retries` counts additional attempts after the first one, so an
/// operation is invoked at most `max_retries + 1` times.
///
/// # Environment Variables
/// - `DASHBOARD_RETRY__MAX_RETRIES`
/// - `DASHBOARD_RETRY__BASE_DELAY_MS`
/// - `DASHBOARD_RETRY__MAX_DELAY_MS`
/// - `DASHBOARD_RETRY__JITTER_MIN_MS` / `DASHBOARD_RETRY__JITTER_MAX_MS`
/// - `DASHBOARD_RETRY__BACKOFF` (`fixed_jitter`, `jitter`, `exponential`,
///   `constant`)
#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq, fake::Dummy)]
#[serde(rename_all = "snake_case")]
#[setters(into)]
pub struct RetryConfig {
    /// Maximum number of attempts after the first one
    pub max_retries: usize,

    /// Starting delay in milliseconds for constant and exponential backoff
    pub base_delay_ms: u64,

    /// Upper bound in milliseconds for exponential backoff
    pub max_delay_ms: u64,

    /// Inclusive lower bound of the jitter range in milliseconds
    pub jitter_min_ms: u64,

    /// Exclusive upper bound of the jitter range in milliseconds
    pub jitter_max_ms: u64,

    /// Delay schedule between attempts
    pub backoff: BackoffStrategy,

    /// Error statuses (within 400..=599) that are returned without retrying
    pub terminal_status_codes: Vec<u16>,

    /// Maximum number of characters of a response body echoed into logs
    pub body_snippet_len: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter_min_ms: 1000,
            jitter_max_ms: 6000,
            backoff: BackoffStrategy::FixedJitter,
            terminal_status_codes: Vec::new(),
            body_snippet_len: 512,
        }
    }
}

impl RetryConfig {
    /// Exponential policy starting at `base_delay`, the schedule used by
    /// callers that collect diagnostics across attempts.
    pub fn exponential(max_retries: usize, base_delay: Duration) -> Self {
        Self::default()
            .max_retries(max_retries)
            .base_delay_ms(base_delay.as_millis() as u64)
            .backoff(BackoffStrategy::Exponential)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Jitter bounds as `(min, max)`. A range whose maximum does not exceed
    /// its minimum collapses to the minimum.
    pub fn jitter_range(&self) -> (Duration, Duration) {
        let min = Duration::from_millis(self.jitter_min_ms);
        let max = Duration::from_millis(self.jitter_max_ms.max(self.jitter_min_ms));
        (min, max)
    }

    /// Total number of invocations the policy allows.
    pub fn total_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    pub fn is_terminal_status(&self, status: u16) -> bool {
        self.terminal_status_codes.contains(&status)
    }
}

/// Transport-level retry policy applied per HTTP request.
///
/// Only safe methods (GET, HEAD, OPTIONS, TRACE) are retried unless
/// `retry_all_methods` is set. Writes may duplicate side effects on the
/// backend when repeated.
///
/// # Environment Variables
/// - `DASHBOARD_TRANSPORT__MAX_RETRIES`
/// - `DASHBOARD_TRANSPORT__DELAY_MS`
/// - `DASHBOARD_TRANSPORT__PAUSE_MS`
/// - `DASHBOARD_TRANSPORT__RETRY_ALL_METHODS`
/// - `DASHBOARD_TRANSPORT__MAX_RETRY_AFTER_SECS`
#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq, fake::Dummy)]
#[serde(rename_all = "snake_case")]
#[setters(into)]
pub struct TransportRetryConfig {
    /// Maximum number of attempts after the first one
    pub max_retries: usize,

    /// Delay in milliseconds after a failed response other than 429
    pub delay_ms: u64,

    /// Pause in milliseconds before every retry
    pub pause_ms: u64,

    /// Retry every method, including non-idempotent writes
    pub retry_all_methods: bool,

    /// Upper bound in seconds for a server-sent `Retry-After`
    pub max_retry_after_secs: u64,
}

impl Default for TransportRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1000,
            pause_ms: 1000,
            retry_all_methods: false,
            max_retry_after_secs: 60,
        }
    }
}

impl TransportRetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn max_retry_after(&self) -> Duration {
        Duration::from_secs(self.max_retry_after_secs)
    }

    pub fn total_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }
}
