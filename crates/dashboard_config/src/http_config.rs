use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP client configuration: timeouts, connection pooling, redirects and the
/// user agent sent to the dashboard API.
///
/// The request timeout is independent of the retry budget; a timed-out
/// request counts as one failed attempt.
///
/// # Environment Variables
/// - `DASHBOARD_HTTP__CONNECT_TIMEOUT`: Connection timeout in seconds (default:
///   30)
/// - `DASHBOARD_HTTP__READ_TIMEOUT`: Read timeout in seconds (default: 300)
/// - `DASHBOARD_HTTP__POOL_IDLE_TIMEOUT`: Pool idle timeout in seconds
///   (default: 90)
/// - `DASHBOARD_HTTP__POOL_MAX_IDLE_PER_HOST`: Max idle connections per host
///   (default: 5)
/// - `DASHBOARD_HTTP__MAX_REDIRECTS`: Maximum redirects to follow (default: 10)
/// - `DASHBOARD_HTTP__USER_AGENT`: Value of the `User-Agent` header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, fake::Dummy)]
#[serde(rename_all = "snake_case")]
pub struct HttpConfig {
    pub connect_timeout: u64,
    pub read_timeout: u64,
    pub pool_idle_timeout: u64,
    pub pool_max_idle_per_host: usize,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            read_timeout: 300,
            pool_idle_timeout: 90,
            pool_max_idle_per_host: 5,
            max_redirects: 10,
            user_agent: "dashboard-terraform-provider".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout)
    }
}
