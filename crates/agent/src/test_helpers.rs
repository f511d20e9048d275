//! Shared test helpers for orchestrator tests.

use async_trait::async_trait;
use ichika_core::error::{ProviderError, ToolError};
use ichika_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use ichika_core::session::Turn;
use ichika_core::tool::{Tool, ToolInvocation, ToolResult};
use std::sync::Mutex;
use std::time::Duration;

/// A mock provider that returns a sequence of scripted replies.
///
/// Each call to `complete` returns the next reply in the queue and records
/// the request. Once the script is exhausted the last reply repeats.
pub struct ScriptedProvider {
    replies: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(text_response(t))).collect())
    }

    /// Wait this long before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let replies = self.replies.lock().unwrap();
        let reply = replies
            .get(index)
            .or_else(|| replies.last())
            .expect("ScriptedProvider needs at least one reply");
        reply.clone()
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        turn: Turn::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn tool_response(calls: Vec<ToolInvocation>) -> ProviderResponse {
    ProviderResponse {
        turn: Turn::tool_request("", calls),
        usage: None,
        model: "mock-model".into(),
    }
}

pub fn call(id: &str, name: &str) -> ToolInvocation {
    ToolInvocation {
        id: id.into(),
        name: name.into(),
        arguments: serde_json::json!({"query": "部室"}),
    }
}

/// A tool that answers with fixed text, optionally after a delay.
pub struct StaticTool {
    pub name: &'static str,
    pub output: &'static str,
    pub delay: Option<Duration>,
}

impl StaticTool {
    pub fn new(name: &'static str, output: &'static str) -> Self {
        Self {
            name,
            output,
            delay: None,
        }
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ToolResult::found(self.output))
    }
}

/// A tool whose backend is always down.
pub struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken_search"
    }

    fn description(&self) -> &str {
        "always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::Backend {
            tool_name: "broken_search".into(),
            reason: "503 Service Unavailable".into(),
        })
    }
}
