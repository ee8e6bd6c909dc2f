//! probe-agent: LLM pilot for a probe in a running universe simulation
//!
//! Connects to the simulation over WebSocket, consults the decision service
//! every N ticks, and answers every tick with an action.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bridge_core::{
    discover_probe, AnthropicClient, Config, Session, SessionSummary, WebSocketTransport,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "probe-agent")]
#[command(about = "LLM agent for a universe simulation probe", version)]
struct Cli {
    /// Server WebSocket URL
    #[arg(long, env = "UNIVERSE_URL")]
    url: Option<String>,

    /// Probe ID (e.g. 1-1). Auto-discovers if omitted
    #[arg(long, env = "UNIVERSE_PROBE")]
    probe: Option<String>,

    /// Decision service API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model to use (overrides config)
    #[arg(long, env = "ANTHROPIC_MODEL")]
    model: Option<String>,

    /// Call the LLM every N ticks
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    deliberation_interval: Option<u64>,

    /// Path to probe-agent.toml (searched for in parent directories otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Load the config file and apply command-line overrides
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load_from(path)?,
            None => Config::load_or_default()?,
        };

        if let Some(ref url) = self.url {
            config.server.url = url.clone();
        }
        if let Some(ref probe) = self.probe {
            config.server.probe = Some(probe.clone());
        }
        if let Some(ref model) = self.model {
            config.llm.model = model.clone();
        }
        if let Some(interval) = self.deliberation_interval {
            config.agent.deliberation_interval = interval;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.resolve_config()?;
    let api_key = cli
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .context("--api-key or ANTHROPIC_API_KEY required")?;

    let probe_id = resolve_probe(&config).await?;
    let client = AnthropicClient::new(&config.llm, api_key)?;

    println!("Connecting to {} ...", config.server.url);
    let transport = WebSocketTransport::connect(&config.server.url).await?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c_canceller(cancel.clone());

    println!(
        "Deliberation every {} ticks. Ctrl+C to stop.\n",
        config.agent.deliberation_interval
    );

    let summary = Session::new(
        transport,
        Arc::new(client),
        &config.session(probe_id),
        cancel,
    )
    .with_cost_rates(config.cost_rates())
    .run()
    .await;

    print_summary(&summary);
    Ok(())
}

/// Use the configured probe or ask the server for the first available one
async fn resolve_probe(config: &Config) -> Result<String> {
    if let Some(ref probe) = config.server.probe {
        return Ok(probe.clone());
    }

    let timeout = Duration::from_secs(config.server.discovery_timeout_secs);
    let probe = discover_probe(&config.server.url, timeout)
        .await
        .context("Probe auto-discovery failed")?
        .context("No probes found. Start the server first.")?;

    println!("Auto-discovered probe {}", probe);
    Ok(probe)
}

fn spawn_ctrl_c_canceller(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });
}

fn print_summary(summary: &SessionSummary) {
    println!(
        "\nTotal: {} ticks, {} input tokens, {} output tokens",
        summary.ticks, summary.usage.input_tokens, summary.usage.output_tokens
    );
    if summary.deliberations > 0 {
        println!(
            "Deliberations: {} ({} failed), {:.0} tokens per call",
            summary.deliberations,
            summary.usage.failed_calls,
            summary.usage.avg_tokens_per_call()
        );
    }
    if let Some(cost) = summary.usage.cost_usd() {
        println!("Estimated cost: ${:.4}", cost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "probe-agent",
            "--url",
            "ws://sim:9000/ws",
            "--probe",
            "3-2",
            "--model",
            "claude-3-5-haiku-latest",
            "--deliberation-interval",
            "4",
            "--config",
            "/nonexistent/probe-agent.toml",
        ]);
        assert!(cli.resolve_config().is_err());

        let cli = Cli {
            config: None,
            ..cli
        };
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.server.url, "ws://sim:9000/ws");
        assert_eq!(config.server.probe.as_deref(), Some("3-2"));
        assert_eq!(config.llm.model, "claude-3-5-haiku-latest");
        assert_eq!(config.agent.deliberation_interval, 4);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let result = Cli::try_parse_from(["probe-agent", "--deliberation-interval", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
