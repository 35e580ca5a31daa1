use clap::Parser;
use dashboard_config::{BackoffStrategy, Environment};
use reqwest::Method;
use reqwest::header::{HeaderValue, InvalidHeaderValue};

/// Sends a single request to the dashboard API through both retry layers and
/// prints the decoded JSON response.
#[derive(Parser, Debug)]
#[command(name = "dashboard-probe", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// HTTP method, case-insensitive.
    #[arg(value_parser = parse_method)]
    pub method: Method,

    /// Path relative to the configured base URL, e.g. `organizations`.
    pub path: String,

    /// JSON request body.
    #[arg(long)]
    pub body: Option<String>,

    /// Overrides `retry.max_retries`.
    #[arg(long)]
    pub max_retries: Option<usize>,

    /// Overrides `retry.backoff`: fixed_jitter, jitter, exponential or
    /// constant.
    #[arg(long)]
    pub backoff: Option<BackoffStrategy>,

    /// Lets the transport resend non-idempotent requests too.
    #[arg(long, default_value_t = false)]
    pub retry_all_methods: bool,

    /// API key sent in the `X-Cisco-Meraki-API-Key` header.
    #[arg(long)]
    pub api_key: Option<String>,
}

impl Cli {
    /// Applies the command line overrides on top of the loaded environment.
    pub fn apply(&self, mut env: Environment) -> Environment {
        if let Some(max_retries) = self.max_retries {
            env.retry.max_retries = max_retries;
        }
        if let Some(backoff) = self.backoff {
            env.retry.backoff = backoff;
        }
        if self.retry_all_methods {
            env.transport.retry_all_methods = true;
        }
        env
    }

    pub fn body(&self) -> anyhow::Result<Option<serde_json::Value>> {
        self.body
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|error| anyhow::anyhow!("--body is not valid JSON: {error}"))
    }

    pub fn api_key(&self) -> Result<Option<HeaderValue>, InvalidHeaderValue> {
        self.api_key
            .as_deref()
            .map(|key| {
                let mut value = HeaderValue::from_str(key)?;
                value.set_sensitive(true);
                Ok(value)
            })
            .transpose()
    }
}

fn parse_method(value: &str) -> Result<Method, String> {
    Method::from_bytes(value.to_ascii_uppercase().as_bytes()).map_err(|error| error.to_string())
}
