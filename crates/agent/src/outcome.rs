//! What one user turn produced.

use ichika_core::error::{MemoryError, ProviderError};

/// Sent when the tool budget for one message is spent.
pub const ITERATION_LIMIT_MESSAGE: &str = "ごめんなさい、調べ物が長くなりすぎてしまったので、今回は回答をまとめられませんでした🙇 質問を少し具体的にしてもう一度聞いてください。";

/// Sent for every failure; details only go to the log.
pub const APOLOGY_MESSAGE: &str =
    "申し訳ありません。エラーが発生してしまいました🙇 時間をおいてもう一度お試しください。";

/// The answer for one user message and how it came about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Text to deliver to the user. Empty only for ignored messages.
    pub text: String,
    pub kind: OutcomeKind,
}

impl TurnOutcome {
    pub(crate) fn new(text: impl Into<String>, kind: OutcomeKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn ignored() -> Self {
        Self::new(String::new(), OutcomeKind::Ignored)
    }

    /// Whether there is something to deliver.
    pub fn should_reply(&self) -> bool {
        self.kind != OutcomeKind::Ignored
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The model produced a final answer
    Answered,
    /// The tool budget ran out before an answer
    IterationLimit,
    Failed(FailureKind),
    /// Bot-authored input; nothing recorded
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The model backend returned an error or an unusable reply
    Provider,
    /// The model call exceeded its timeout
    ProviderTimeout,
    /// The model requested a tool that is not registered
    UnknownTool,
    /// The whole turn exceeded its timeout
    TurnTimeout,
    /// The session rejected a turn
    Memory,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Provider => "provider",
            FailureKind::ProviderTimeout => "provider_timeout",
            FailureKind::UnknownTool => "unknown_tool",
            FailureKind::TurnTimeout => "turn_timeout",
            FailureKind::Memory => "memory",
        }
    }
}

/// Why a turn was aborted.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TurnError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("model call timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("model returned an empty answer")]
    EmptyAnswer,

    #[error("model requested unknown tool '{0}'")]
    UnknownTool(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl TurnError {
    pub(crate) fn kind(&self) -> FailureKind {
        match self {
            TurnError::Provider(_) | TurnError::EmptyAnswer => FailureKind::Provider,
            TurnError::ProviderTimeout(_) => FailureKind::ProviderTimeout,
            TurnError::UnknownTool(_) => FailureKind::UnknownTool,
            TurnError::Memory(_) => FailureKind::Memory,
        }
    }
}
