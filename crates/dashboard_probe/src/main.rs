mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use dashboard_config::Environment;
use dashboard_http::DashboardClient;
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // stdout carries the response body only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let env = cli.apply(Environment::from_env().context("Failed to load configuration")?);
    tracing::debug!(version = %env.version(), base_url = %env.base_url, "Loaded configuration");

    let client = DashboardClient::from_env(&env)?;
    let mut request = client.request(cli.method.clone(), &cli.path)?;
    if let Some(body) = cli.body()? {
        request = request.json(&body)?;
    }
    if let Some(key) = cli.api_key().context("Invalid API key")? {
        request.headers.insert("x-cisco-meraki-api-key", key);
    }

    let mut execution = client.call_with_diagnostics::<Value>(request).await;
    let attempts = execution.attempts;
    let status = execution.status();
    let diagnostics = std::mem::take(&mut execution.diagnostics);

    match execution.into_result() {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value.unwrap_or(Value::Null))?);
            tracing::info!(attempts, ?status, "Request succeeded");
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            for diagnostic in diagnostics.iter() {
                eprintln!("{diagnostic}\n  {}", diagnostic.detail);
            }
            eprintln!("error: {error}");
            tracing::error!(attempts, ?status, "Request failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
