//! Session and Turn domain types.
//!
//! A session is the ordered history of one conversation thread. Turns are
//! appended as the agent loop progresses and never reordered:
//! user turn → (assistant turn with tool calls → tool turns)* → assistant turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::tool::ToolInvocation;

/// Identifies one logical conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking
    User,
    /// The bot, either a final answer or a request for tools
    Assistant,
    /// A tool's observation
    Tool,
}

/// One recorded step of a conversation. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,

    pub role: Role,

    pub content: String,

    /// Tool invocations requested by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,

    /// Which tool produced an observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// The invocation id an observation answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
            call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// A user's message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// A final answer from the bot.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// An assistant turn that asks for one or more tools to be run.
    pub fn tool_request(thought: impl Into<String>, calls: Vec<ToolInvocation>) -> Self {
        let mut turn = Self::with_role(Role::Assistant, thought);
        turn.tool_calls = calls;
        turn
    }

    /// The observation produced by running `call`.
    pub fn observation(call: &ToolInvocation, content: impl Into<String>) -> Self {
        let mut turn = Self::with_role(Role::Tool, content);
        turn.tool_name = Some(call.name.clone());
        turn.call_id = Some(call.id.clone());
        turn
    }
}

/// The ordered history of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,

    turns: Vec<Turn>,

    pub created_at: DateTime<Utc>,

    /// When the last turn was appended (or the session was created)
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            turns: Vec::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Append a turn.
    ///
    /// Tool turns are only accepted when they answer a call issued by the
    /// nearest preceding assistant turn.
    pub fn push(&mut self, turn: Turn) -> Result<(), MemoryError> {
        if turn.role == Role::Tool {
            let call_id = turn.call_id.clone().unwrap_or_default();
            let issuer = self
                .turns
                .iter()
                .rev()
                .find(|t| t.role != Role::Tool);
            let issued = issuer.is_some_and(|t| {
                t.role == Role::Assistant && t.tool_calls.iter().any(|c| c.id == call_id)
            });
            if !issued {
                return Err(MemoryError::OrphanedObservation { call_id });
            }
        }
        self.last_active = Utc::now();
        self.turns.push(turn);
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop whole leading exchanges until at most `max_turns` remain.
    ///
    /// Cuts only at user turns, so the history never starts with an
    /// observation whose request was removed. The newest exchange is always
    /// kept even if it alone exceeds the cap.
    pub fn trim_front(&mut self, max_turns: usize) -> usize {
        if self.turns.len() <= max_turns {
            return 0;
        }
        let excess = self.turns.len() - max_turns;
        let cut = self
            .turns
            .iter()
            .enumerate()
            .skip(excess)
            .find(|(_, t)| t.role == Role::User)
            .map(|(i, _)| i)
            .or_else(|| self.turns.iter().rposition(|t| t.role == Role::User))
            .unwrap_or(0);
        self.turns.drain(..cut);
        cut
    }
}
