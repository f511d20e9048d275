//! OpenAI-compatible provider implementation.
//!
//! Works with: Gemini (`/v1beta/openai`), OpenAI, DeepSeek, OpenRouter,
//! Ollama, and any other OpenAI-compatible endpoint.
//!
//! Supports non-streaming chat completions with tool use / function calling.

use async_trait::async_trait;
use ichika_core::error::ProviderError;
use ichika_core::provider::*;
use ichika_core::session::{Role, Turn};
use ichika_core::tool::ToolInvocation;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible model provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider whose requests time out after
    /// `timeout_secs`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout_secs,
            client,
        })
    }

    /// Convert the system prompt and session turns to OpenAI API messages.
    fn to_api_messages(system: &str, turns: &[Turn]) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ApiMessage {
            role: "system".into(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });

        messages.extend(turns.iter().map(|t| {
            let role = match t.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let tool_calls = if t.tool_calls.is_empty() {
                None
            } else {
                Some(
                    t.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect(),
                )
            };
            // Assistant turns that only request tools carry no text.
            let content = if tool_calls.is_some() && t.content.is_empty() {
                None
            } else {
                Some(t.content.clone())
            };
            ApiMessage {
                role: role.into(),
                content,
                tool_calls,
                tool_call_id: t.call_id.clone(),
            }
        }));

        messages
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Convert an API tool call into an invocation.
    ///
    /// Arguments that are not valid JSON are kept as a raw string so the tool
    /// rejects them and the model sees why. Some backends omit call ids.
    fn to_invocation(tc: ApiToolCall) -> ToolInvocation {
        let arguments = serde_json::from_str(&tc.function.arguments)
            .unwrap_or(serde_json::Value::String(tc.function.arguments));
        let id = if tc.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            tc.id
        };
        ToolInvocation {
            id,
            name: tc.function.name,
            arguments,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.timeout_secs)
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.system, &request.turns),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, turns = request.turns.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let calls: Vec<ToolInvocation> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(Self::to_invocation)
            .collect();

        let content = choice.message.content.unwrap_or_default();
        let turn = if calls.is_empty() {
            Turn::assistant(content)
        } else {
            Turn::tool_request(content, calls)
        };

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            turn,
            usage,
            model: api_response.model.unwrap_or(request.model),
        })
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "default_call_type")]
    r#type: String,
    function: ApiFunction,
}

fn default_call_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(turns: Vec<Turn>) -> ProviderRequest {
        ProviderRequest {
            model: "gemini-2.0-flash".into(),
            system: "You are Ichika".into(),
            turns,
            temperature: 0.7,
            max_tokens: None,
            tools: vec![ToolDefinition {
                name: "wiki_search".into(),
                description: "Search the wiki".into(),
                parameters: json!({"type": "object"}),
            }],
        }
    }

    #[test]
    fn turn_conversion_keeps_tool_links() {
        let call = ToolInvocation {
            id: "call_1".into(),
            name: "wiki_search".into(),
            arguments: json!({"query": "部室"}),
        };
        let turns = vec![
            Turn::user("部室はどこ?"),
            Turn::tool_request("", vec![call.clone()]),
            Turn::observation(&call, "タイトル: 部室"),
        ];
        let api = OpenAiCompatProvider::to_api_messages("sys", &turns);
        assert_eq!(api.len(), 4);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert!(api[2].content.is_none());
        let calls = api[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"query":"部室"}"#);
        assert_eq!(api[3].role, "tool");
        assert_eq!(api[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tool_definition_conversion() {
        let api_tools = OpenAiCompatProvider::to_api_tools(&request(vec![]).tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "wiki_search");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn invalid_arguments_are_kept_raw() {
        let invocation = OpenAiCompatProvider::to_invocation(ApiToolCall {
            id: String::new(),
            r#type: "function".into(),
            function: ApiFunction {
                name: "web_search".into(),
                arguments: "not json".into(),
            },
        });
        assert!(invocation.id.starts_with("call_"));
        assert_eq!(invocation.arguments, json!("not json"));
    }

    #[tokio::test]
    async fn complete_parses_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "gemini-2.0-flash", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gemini-2.0-flash",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_9",
                            "type": "function",
                            "function": {"name": "wiki_search", "arguments": "{\"query\":\"部室\"}"}
                        }]
                    }
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("gemini", server.uri(), "test-key", 5).unwrap();
        let response = provider
            .complete(request(vec![Turn::user("部室はどこ?")]))
            .await
            .unwrap();

        assert!(!response.is_final());
        assert_eq!(response.tool_calls()[0].id, "call_9");
        assert_eq!(response.tool_calls()[0].arguments["query"], "部室");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn complete_returns_final_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "部室は本館にあります"}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("gemini", server.uri(), "k", 5).unwrap();
        let response = provider.complete(request(vec![Turn::user("q")])).await.unwrap();
        assert!(response.is_final());
        assert_eq!(response.turn.content, "部室は本館にあります");
        assert_eq!(response.model, "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn error_statuses_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let provider = OpenAiCompatProvider::new("gemini", server.uri(), "bad", 5).unwrap();
        let err = provider.complete(request(vec![])).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let provider = OpenAiCompatProvider::new("gemini", server.uri(), "k", 5).unwrap();
        let err = provider.complete(request(vec![])).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 500, .. }));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": []}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        let provider = OpenAiCompatProvider::new("gemini", server.uri(), "k", 1).unwrap();
        let err = provider.complete(request(vec![])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(1)));
    }
}
