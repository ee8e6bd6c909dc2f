//! Probe auto-discovery via the simulation's status endpoint

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::protocol::id_string;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    probes: Vec<ProbeEntry>,
}

#[derive(Debug, Deserialize)]
struct ProbeEntry {
    #[serde(default)]
    id: Value,
}

/// Derive the HTTP status URL from the simulation's WebSocket URL.
///
/// `ws://host:8000/ws` becomes `http://host:8000/api/status`.
pub fn status_url(ws_url: &str) -> String {
    let url = ws_url.trim().trim_end_matches('/');
    let url = if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else {
        url.to_string()
    };

    match url.strip_suffix("/ws") {
        Some(base) => format!("{}/api/status", base),
        None => format!("{}/api/status", url),
    }
}

/// Ask the simulation which probes exist and return the first one.
///
/// `Ok(None)` means the server answered but lists no probes.
pub async fn discover_probe(ws_url: &str, timeout: Duration) -> Result<Option<String>> {
    let url = status_url(ws_url);
    debug!(url = %url, "Discovering probes");

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let status: StatusResponse = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?
        .error_for_status()
        .context("Status request failed")?
        .json()
        .await
        .context("Failed to parse status response")?;

    Ok(status.probes.first().and_then(|p| id_string(&p.id)))
}
