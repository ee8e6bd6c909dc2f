//! Session loop: registration, deliberation throttle, and the per-tick
//! observe → decide → act cycle for one probe.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::anthropic::DecisionClient;
use crate::interpret::interpret;
use crate::prompt::build_system_prompt;
use crate::protocol::{Action, ClientMessage, Observation, ServerMessage};
use crate::transport::SimTransport;
use crate::usage::{CostRates, DecisionLog, DecisionRecord, UsageTracker};

// ANSI colors
const CYAN: &str = "\x1b[96m";
const RESET: &str = "\x1b[0m";

/// Settings for one session, built once at startup
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Probe to register for
    pub probe_id: String,
    /// Consult the decision service every N ticks
    pub deliberation_interval: u64,
    pub decision_log_capacity: usize,
    /// Print monologues to stdout
    pub echo_monologue: bool,
}

impl SessionConfig {
    pub fn new(probe_id: impl Into<String>) -> Self {
        Self {
            probe_id: probe_id.into(),
            deliberation_interval: 10,
            decision_log_capacity: 1024,
            echo_monologue: true,
        }
    }

    pub fn with_deliberation_interval(mut self, interval: u64) -> Self {
        self.deliberation_interval = interval;
        self
    }

    pub fn with_echo_monologue(mut self, echo: bool) -> Self {
        self.echo_monologue = echo;
        self
    }
}

/// Whether tick `tick` (1-based) consults the decision service
pub fn should_deliberate(tick: u64, interval: u64) -> bool {
    tick == 1 || (interval > 0 && tick % interval == 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Registering,
    AwaitingFirstObservation,
    Active,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Connecting => "connecting",
            SessionPhase::Registering => "registering",
            SessionPhase::AwaitingFirstObservation => "awaiting_first_observation",
            SessionPhase::Active => "active",
            SessionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The simulation closed the connection
    RemoteClosed,
    /// Receiving or sending failed
    TransportError(String),
    /// The cancellation token fired
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::RemoteClosed => write!(f, "server closed connection"),
            CloseReason::TransportError(e) => write!(f, "transport error: {}", e),
            CloseReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final counters of a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub probe_id: String,
    /// Tick observations processed
    pub ticks: u64,
    /// Ticks on which the decision service was consulted
    pub deliberations: u64,
    pub usage: UsageTracker,
    pub decisions: Vec<DecisionRecord>,
    pub close_reason: CloseReason,
}

/// One probe's connection to the simulation
pub struct Session<T> {
    transport: T,
    client: Arc<dyn DecisionClient>,
    config: SessionConfig,
    cancel: CancellationToken,
    phase: SessionPhase,
    system_prompt: Option<String>,
    ticks: u64,
    deliberations: u64,
    usage: UsageTracker,
    log: DecisionLog,
}

impl<T: SimTransport> Session<T> {
    /// Wrap an already-open transport
    pub fn new(
        transport: T,
        client: Arc<dyn DecisionClient>,
        config: &SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            client,
            config: config.clone(),
            cancel,
            phase: SessionPhase::Connecting,
            system_prompt: None,
            ticks: 0,
            deliberations: 0,
            usage: UsageTracker::new(),
            log: DecisionLog::new(config.decision_log_capacity),
        }
    }

    pub fn with_cost_rates(mut self, rates: Option<CostRates>) -> Self {
        self.usage = UsageTracker::with_rates(rates);
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Run until the connection closes or the token is cancelled
    #[instrument(skip(self), fields(probe = %self.config.probe_id))]
    pub async fn run(mut self) -> SessionSummary {
        info!(
            interval = self.config.deliberation_interval,
            "Starting session"
        );

        let reason = match self.register().await {
            ControlFlow::Break(reason) => reason,
            ControlFlow::Continue(first) => self.drive(first).await,
        };

        self.close(reason).await
    }

    /// Send the registration and consume the acknowledgment.
    ///
    /// A missing or mismatched acknowledgment is only logged. If the first
    /// frame is already an observation it is handed back for processing.
    async fn register(&mut self) -> ControlFlow<CloseReason, Option<Observation>> {
        self.phase = SessionPhase::Registering;

        let register = ClientMessage::Register {
            probe_id: self.config.probe_id.clone(),
        };
        match register.to_json() {
            Ok(text) => self.send_frame(text).await?,
            Err(e) => return ControlFlow::Break(CloseReason::TransportError(format!("{:#}", e))),
        }

        let frame = self.recv_frame().await?;
        self.phase = SessionPhase::AwaitingFirstObservation;

        match ServerMessage::decode(&frame) {
            Ok(ServerMessage::Registered { probe_id }) => {
                match probe_id {
                    Some(ref id) if *id == self.config.probe_id => {
                        info!(probe = %id, "Registered");
                    }
                    other => {
                        warn!(
                            expected = %self.config.probe_id,
                            acknowledged = ?other,
                            "Registration acknowledged for a different probe"
                        );
                    }
                }
                ControlFlow::Continue(None)
            }
            Ok(ServerMessage::Observe(observation)) => {
                warn!("No registration acknowledgment, observation arrived first");
                ControlFlow::Continue(Some(observation))
            }
            Ok(ServerMessage::Other { kind }) => {
                warn!(kind = ?kind, "Unexpected reply to registration");
                ControlFlow::Continue(None)
            }
            Err(e) => {
                warn!(error = %e, "Undecodable reply to registration");
                ControlFlow::Continue(None)
            }
        }
    }

    async fn drive(&mut self, mut pending: Option<Observation>) -> CloseReason {
        loop {
            let observation = match pending.take() {
                Some(observation) => observation,
                None => match self.next_observation().await {
                    ControlFlow::Continue(observation) => observation,
                    ControlFlow::Break(reason) => return reason,
                },
            };

            if let ControlFlow::Break(reason) = self.on_tick(observation).await {
                return reason;
            }
        }
    }

    /// Receive frames until a tick observation arrives; everything else is ignored
    async fn next_observation(&mut self) -> ControlFlow<CloseReason, Observation> {
        loop {
            let frame = self.recv_frame().await?;
            match ServerMessage::decode(&frame) {
                Ok(ServerMessage::Observe(observation)) => return ControlFlow::Continue(observation),
                Ok(ServerMessage::Registered { .. }) => debug!("Ignoring late registration ack"),
                Ok(ServerMessage::Other { kind }) => debug!(kind = ?kind, "Ignoring message"),
                Err(e) => debug!(error = %e, "Ignoring undecodable frame"),
            }
        }
    }

    async fn on_tick(&mut self, observation: Observation) -> ControlFlow<CloseReason> {
        self.ticks += 1;
        let tick = self.ticks;

        if self.system_prompt.is_none() {
            let prompt = build_system_prompt(&observation);
            debug!(chars = prompt.len(), "Built system prompt");
            self.system_prompt = Some(prompt);
            self.phase = SessionPhase::Active;
        }

        if !should_deliberate(tick, self.config.deliberation_interval) {
            return self.send_action(&Action::wait()).await;
        }

        self.deliberations += 1;
        let sim_tick = observation.tick();
        let observation_text = observation.to_prompt_text();
        let instructions = self.system_prompt.as_deref().unwrap_or_default();
        debug!(tick, sim_tick = ?sim_tick, "Deliberating");

        let decision = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(tick, "Cancelled during deliberation, skipping tick");
                return ControlFlow::Break(CloseReason::Cancelled);
            }
            decision = self.client.decide(instructions, &observation_text) => decision,
        };
        self.usage.record(&decision);

        let (action, monologue) = match decision.text.as_deref() {
            Some(text) => interpret(text),
            None => (Action::wait(), String::new()),
        };

        if !monologue.is_empty() {
            debug!(tick, monologue = %monologue, "Monologue");
            if self.config.echo_monologue {
                let label = sim_tick.map_or_else(|| "?".to_string(), |t| t.to_string());
                println!("{}[tick {}]{} {}", CYAN, label, RESET, monologue);
            }
        }
        info!(tick, action = %action.action, "Decided");

        self.log.record(DecisionRecord {
            tick,
            sim_tick,
            action: action.clone(),
            monologue,
            input_tokens: decision.input_tokens,
            output_tokens: decision.output_tokens,
        });

        self.send_action(&action).await
    }

    async fn send_action(&mut self, action: &Action) -> ControlFlow<CloseReason> {
        match action.to_json() {
            Ok(text) => self.send_frame(text).await,
            Err(e) => ControlFlow::Break(CloseReason::TransportError(format!("{:#}", e))),
        }
    }

    async fn send_frame(&mut self, text: String) -> ControlFlow<CloseReason> {
        match self.transport.send(text).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => ControlFlow::Break(CloseReason::TransportError(format!("{:#}", e))),
        }
    }

    async fn recv_frame(&mut self) -> ControlFlow<CloseReason, String> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => ControlFlow::Break(CloseReason::Cancelled),
            frame = self.transport.recv() => match frame {
                Ok(Some(text)) => ControlFlow::Continue(text),
                Ok(None) => ControlFlow::Break(CloseReason::RemoteClosed),
                Err(e) => ControlFlow::Break(CloseReason::TransportError(format!("{:#}", e))),
            },
        }
    }

    async fn close(mut self, reason: CloseReason) -> SessionSummary {
        self.phase = SessionPhase::Closed;
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "Transport close failed");
        }

        info!(
            reason = %reason,
            ticks = self.ticks,
            deliberations = self.deliberations,
            input_tokens = self.usage.input_tokens,
            output_tokens = self.usage.output_tokens,
            "Session closed"
        );

        SessionSummary {
            probe_id: self.config.probe_id,
            ticks: self.ticks,
            deliberations: self.deliberations,
            usage: self.usage,
            decisions: self.log.into_vec(),
            close_reason: reason,
        }
    }
}
