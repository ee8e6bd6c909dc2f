//! bridge-core: lets an LLM pilot a probe inside a running universe simulation
//!
//! Provides:
//! - Configuration loading (probe-agent.toml)
//! - Simulation wire protocol and transports (WebSocket, in-process channels)
//! - Probe auto-discovery
//! - System prompt construction from the probe's personality
//! - Anthropic decision client
//! - Response interpretation with layered fallback to `wait`
//! - The session loop with deliberation throttling and usage accounting

pub mod anthropic;
pub mod config;
pub mod discovery;
pub mod interpret;
pub mod prompt;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod usage;

pub use anthropic::{AnthropicClient, Decision, DecisionClient};
pub use config::Config;
pub use discovery::discover_probe;
pub use interpret::interpret;
pub use prompt::build_system_prompt;
pub use protocol::{Action, ActionKind, Observation, ServerMessage};
pub use session::{CloseReason, Session, SessionConfig, SessionPhase, SessionSummary};
pub use transport::{ChannelTransport, SimTransport, WebSocketTransport};
pub use usage::{CostRates, DecisionLog, DecisionRecord, UsageTracker};
