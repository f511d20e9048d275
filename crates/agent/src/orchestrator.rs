//! The reason-act-observe loop.

use chrono::{FixedOffset, Offset, Utc};
use ichika_config::{AgentConfig, AppConfig};
use ichika_core::channel::InboundMessage;
use ichika_core::error::ToolError;
use ichika_core::event::{DomainEvent, EventBus};
use ichika_core::persona::Persona;
use ichika_core::provider::{Provider, ProviderRequest};
use ichika_core::session::{Role, Turn};
use ichika_core::tool::{ToolInvocation, ToolRegistry};
use ichika_memory::{SessionGuard, SessionStore};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::outcome::{
    APOLOGY_MESSAGE, FailureKind, ITERATION_LIMIT_MESSAGE, OutcomeKind, TurnError, TurnOutcome,
};

/// Drives one user message at a time per session through the model and tools.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,

    model: String,

    temperature: f32,

    max_tokens: Option<u32>,

    tools: Arc<ToolRegistry>,

    sessions: Arc<SessionStore>,

    persona: Persona,

    event_bus: Arc<EventBus>,

    /// Tool invocations allowed per user message
    max_tool_calls: u32,

    model_timeout: Duration,

    tool_timeout: Duration,

    turn_timeout: Duration,

    /// Offset of the timestamp stamped into the system prompt
    display_offset: FixedOffset,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
        persona: Persona,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let defaults = AgentConfig::default();
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            sessions,
            persona,
            event_bus,
            max_tool_calls: defaults.max_tool_calls,
            model_timeout: Duration::from_secs(defaults.model_timeout_secs),
            tool_timeout: Duration::from_secs(defaults.tool_timeout_secs),
            turn_timeout: Duration::from_secs(defaults.turn_timeout_secs),
            display_offset: FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }

    /// Wire an orchestrator with fresh session memory, the configured persona
    /// and every bound from `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let persona = Persona::load(
            config.persona.name.as_deref(),
            config.persona.system_prompt_override.as_deref(),
            config.persona.system_prompt_file.as_deref().map(Path::new),
        );
        let offset = FixedOffset::east_opt(config.traq.display_utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());

        Self::new(
            provider,
            model,
            tools,
            Arc::new(SessionStore::new(&config.memory)),
            persona,
            Arc::new(EventBus::default()),
        )
        .with_limits(&config.agent)
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_display_offset(offset)
    }

    /// Apply the loop bounds from `[agent]`.
    pub fn with_limits(mut self, config: &AgentConfig) -> Self {
        self.max_tool_calls = config.max_tool_calls;
        self.model_timeout = Duration::from_secs(config.model_timeout_secs);
        self.tool_timeout = Duration::from_secs(config.tool_timeout_secs);
        self.turn_timeout = Duration::from_secs(config.turn_timeout_secs);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_max_tool_calls(mut self, max: u32) -> Self {
        self.max_tool_calls = max;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_display_offset(mut self, offset: FixedOffset) -> Self {
        self.display_offset = offset;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Answer one user message.
    ///
    /// Holds the session lock for the whole turn, so messages for the same
    /// key are answered in arrival order. Always records an assistant turn
    /// for the returned text; bot-authored messages are ignored.
    pub async fn process(&self, message: &InboundMessage) -> TurnOutcome {
        let key = &message.session_key;
        if message.author_is_bot {
            debug!(session = %key, "Ignoring bot-authored message");
            return TurnOutcome::ignored();
        }

        info!(session = %key, channel_id = %message.channel_id, "Processing message");
        self.event_bus.publish(DomainEvent::MessageReceived {
            session_key: key.to_string(),
            channel_id: message.channel_id.clone(),
            content_preview: message.text.chars().take(50).collect(),
            timestamp: Utc::now(),
        });

        let mut session = self.sessions.lock(key).await;
        let result = tokio::time::timeout(self.turn_timeout, self.run_turn(&mut session, message)).await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(session = %key, error = %e, "Turn failed");
                self.fail(&mut session, e.kind())
            }
            Err(_) => {
                error!(
                    session = %key,
                    timeout_secs = self.turn_timeout.as_secs(),
                    "Turn timed out"
                );
                self.fail(&mut session, FailureKind::TurnTimeout)
            }
        };

        debug!(session = %key, kind = ?outcome.kind, turns = session.len(), "Turn finished");
        outcome
    }

    /// Reason, act and observe until the model answers or the budget runs out.
    async fn run_turn(
        &self,
        session: &mut SessionGuard,
        message: &InboundMessage,
    ) -> Result<TurnOutcome, TurnError> {
        session.append(Turn::user(&message.text))?;

        let definitions = self.tools.definitions();
        let mut calls_used: u32 = 0;

        loop {
            let request = ProviderRequest {
                model: self.model.clone(),
                system: self.persona.render(Utc::now().with_timezone(&self.display_offset)),
                turns: session.turns().to_vec(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
            };

            debug!(session = %session.key, turns = request.turns.len(), "Calling model");
            let response = tokio::time::timeout(self.model_timeout, self.provider.complete(request))
                .await
                .map_err(|_| TurnError::ProviderTimeout(self.model_timeout.as_secs()))??;

            if let Some(usage) = &response.usage {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    session_key: session.key.to_string(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            if response.is_final() {
                let text = response.turn.content.clone();
                if text.trim().is_empty() {
                    return Err(TurnError::EmptyAnswer);
                }
                session.append(response.turn)?;
                return Ok(TurnOutcome::new(text, OutcomeKind::Answered));
            }

            let calls = response.tool_calls().to_vec();
            let requested = u32::try_from(calls.len()).unwrap_or(u32::MAX);
            if calls_used.saturating_add(requested) > self.max_tool_calls {
                warn!(
                    session = %session.key,
                    used = calls_used,
                    requested,
                    max = self.max_tool_calls,
                    "Tool budget exhausted, giving up on this message"
                );
                session.append(Turn::assistant(ITERATION_LIMIT_MESSAGE))?;
                return Ok(TurnOutcome::new(
                    ITERATION_LIMIT_MESSAGE,
                    OutcomeKind::IterationLimit,
                ));
            }

            // Unknown tools abort the turn before anything is recorded
            for call in &calls {
                if let Err(ToolError::NotFound(name)) = self.tools.resolve(&call.name) {
                    return Err(TurnError::UnknownTool(name));
                }
            }

            calls_used += requested;
            session.append(response.turn)?;

            for call in &calls {
                let observation = self.run_tool(&session.key.to_string(), call).await;
                session.append(Turn::observation(call, observation))?;
            }
        }
    }

    /// Execute one tool call under the tool timeout and render the observation.
    async fn run_tool(&self, session_key: &str, call: &ToolInvocation) -> String {
        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        let start = Instant::now();

        let result = match tokio::time::timeout(self.tool_timeout, self.tools.execute(call)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.tool_timeout.as_secs(),
            }),
        };
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.event_bus.publish(DomainEvent::ToolExecuted {
            session_key: session_key.to_string(),
            tool_name: call.name.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match result {
            Ok(result) => {
                debug!(tool = %call.name, found = result.found, duration_ms, "Tool finished");
                result.output
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                // Reported to the model so it can recover
                format!("Error: {e}")
            }
        }
    }

    /// Close out a failed turn with the generic apology.
    fn fail(&self, session: &mut SessionGuard, kind: FailureKind) -> TurnOutcome {
        // A turn cut short may leave calls without observations
        for call in pending_calls(session.turns()) {
            if let Err(e) = session.append(Turn::observation(&call, "Error: aborted")) {
                warn!(error = %e, "Could not close pending tool call");
            }
        }
        if let Err(e) = session.append(Turn::assistant(APOLOGY_MESSAGE)) {
            warn!(error = %e, "Could not record apology turn");
        }

        self.event_bus.publish(DomainEvent::TurnFailed {
            session_key: session.key.to_string(),
            kind: kind.as_str().into(),
            timestamp: Utc::now(),
        });
        TurnOutcome::new(APOLOGY_MESSAGE, OutcomeKind::Failed(kind))
    }
}

/// Calls of the latest assistant turn that have no observation yet.
fn pending_calls(turns: &[Turn]) -> Vec<ToolInvocation> {
    let Some(idx) = turns.iter().rposition(|t| t.role != Role::Tool) else {
        return Vec::new();
    };
    let issuer = &turns[idx];
    if issuer.role != Role::Assistant {
        return Vec::new();
    }
    let answered: Vec<&str> = turns[idx + 1..]
        .iter()
        .filter_map(|t| t.call_id.as_deref())
        .collect();
    issuer
        .tool_calls
        .iter()
        .filter(|c| !answered.contains(&c.id.as_str()))
        .cloned()
        .collect()
}
