//! Configuration management for probe-agent.toml

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::session::SessionConfig;
use crate::usage::CostRates;

/// Name of the configuration file searched for on startup
pub const CONFIG_FILE_NAME: &str = "probe-agent.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub cost: Option<CostConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket endpoint of the simulation
    pub url: String,
    /// Probe to control; auto-discovered when unset
    pub probe: Option<String>,
    pub discovery_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Consult the LLM every N ticks
    pub deliberation_interval: u64,
    pub decision_log_capacity: usize,
    /// Print the probe's monologue to stdout
    pub echo_monologue: bool,
}

/// Token prices in USD per million tokens
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CostConfig {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            probe: None,
            discovery_timeout_secs: 5,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 512,
            timeout_secs: 30,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            deliberation_interval: 10,
            decision_log_capacity: 1024,
            echo_monologue: true,
        }
    }
}

impl Config {
    /// Load configuration from probe-agent.toml
    pub fn load() -> Result<Self> {
        Self::load_from(Self::find_config_path()?)
    }

    /// Load the config file if one exists, defaults otherwise.
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default() -> Result<Self> {
        match Self::find_config_path() {
            Ok(path) => Self::load_from(path),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find probe-agent.toml by searching current directory and parents
    pub fn find_config_path() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;

        for _ in 0..10 {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("{} not found in current directory or parents", CONFIG_FILE_NAME)
    }

    /// Reject values the session loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            anyhow::bail!("server.url must not be empty");
        }
        if self.llm.model.trim().is_empty() {
            anyhow::bail!("llm.model must not be empty");
        }
        if self.llm.max_tokens == 0 {
            anyhow::bail!("llm.max_tokens must be at least 1");
        }
        if self.agent.deliberation_interval == 0 {
            anyhow::bail!("agent.deliberation_interval must be at least 1");
        }
        Ok(())
    }

    /// Per-session settings for the given probe
    pub fn session(&self, probe_id: impl Into<String>) -> SessionConfig {
        SessionConfig {
            probe_id: probe_id.into(),
            deliberation_interval: self.agent.deliberation_interval,
            decision_log_capacity: self.agent.decision_log_capacity,
            echo_monologue: self.agent.echo_monologue,
        }
    }

    pub fn cost_rates(&self) -> Option<CostRates> {
        self.cost.map(|c| CostRates {
            input_per_mtok: c.input_per_mtok,
            output_per_mtok: c.output_per_mtok,
        })
    }
}
