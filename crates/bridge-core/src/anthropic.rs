//! Decision service client (Anthropic Messages API)

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Outcome of one consultation.
///
/// `text` is `None` when the call failed for any reason; the counters are
/// zero in that case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub text: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Decision {
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn answered(text: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            text: Some(text.into()),
            input_tokens,
            output_tokens,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.text.is_none()
    }
}

/// Something that can be asked what the probe should do next.
///
/// Implementations signal failure through [`Decision::failed`] instead of
/// returning errors, and never retry.
#[async_trait]
pub trait DecisionClient: Send + Sync {
    async fn decide(&self, instructions: &str, observation: &str) -> Decision;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Value,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic API client
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Create a client from the `[llm]` config section
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, instructions: &str, observation: &str) -> Result<Decision> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: instructions,
            messages: [UserMessage {
                role: "user",
                content: observation,
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("Failed to reach decision service")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("API error: {} {}", status, text);
        }

        let envelope: MessagesResponse = resp
            .json()
            .await
            .context("Failed to parse decision service response")?;

        let text = envelope
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .context("Response carried no text block")?;

        Ok(Decision::answered(
            text,
            usage_count(&envelope.usage, "input_tokens"),
            usage_count(&envelope.usage, "output_tokens"),
        ))
    }
}

fn usage_count(usage: &Value, key: &str) -> u64 {
    usage.get(key).and_then(Value::as_u64).unwrap_or(0)
}

#[async_trait]
impl DecisionClient for AnthropicClient {
    async fn decide(&self, instructions: &str, observation: &str) -> Decision {
        match self.request(instructions, observation).await {
            Ok(decision) => {
                debug!(
                    input_tokens = decision.input_tokens,
                    output_tokens = decision.output_tokens,
                    "Decision service answered"
                );
                decision
            }
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(error = %error, "Decision service call failed");
                Decision::failed()
            }
        }
    }
}
