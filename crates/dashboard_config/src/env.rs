use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{HttpConfig, RetryConfig, TransportRetryConfig};

const VERSION: &str = match option_env!("APP_VERSION") {
    Some(val) => val,
    None => env!("CARGO_PKG_VERSION"),
};

/// Embedded defaults, compiled into the binary.
const DEFAULT_CONFIG: &str = include_str!("../env.json");

#[derive(Debug, Setters, Clone, PartialEq, Serialize, Deserialize, fake::Dummy)]
#[serde(rename_all = "snake_case")]
#[setters(into)]
/// Settings shared by every call against the dashboard API.
pub struct Environment {
    /// Base URL that relative API paths are joined onto
    #[dummy(expr = "url::Url::parse(\"https://api.example.com/api/v1/\").unwrap()")]
    pub base_url: Url,
    /// HTTP client configuration
    pub http: HttpConfig,
    /// Application-level retry policy
    pub retry: RetryConfig,
    /// Transport-level retry policy
    pub transport: TransportRetryConfig,
}

impl Environment {
    /// Creates an Environment from the embedded defaults overlaid with
    /// environment variables.
    ///
    /// Variables are prefixed with `DASHBOARD_` and use a double underscore
    /// (`__`) to reach nested fields:
    /// - `DASHBOARD_BASE_URL` -> `base_url`
    /// - `DASHBOARD_RETRY__MAX_RETRIES` -> `retry.max_retries`
    /// - `DASHBOARD_RETRY__TERMINAL_STATUS_CODES=401,404` ->
    ///   `retry.terminal_status_codes`
    /// - `DASHBOARD_TRANSPORT__RETRY_ALL_METHODS` ->
    ///   `transport.retry_all_methods`
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed into the expected type.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(Self::env_source())
    }

    /// Parses only the embedded defaults.
    pub fn defaults() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Json,
            ))
            .build()?
            .try_deserialize()
    }

    fn env_source() -> config::Environment {
        config::Environment::with_prefix("DASHBOARD")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("retry.terminal_status_codes")
            .try_parsing(true)
    }

    fn load(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Json,
            ))
            // Environment variables override the embedded defaults
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    pub fn version(&self) -> String {
        VERSION.to_string()
    }
}
