//! Web search tool: DuckDuckGo Instant Answer API.
//!
//! Returns the abstract and related-topic texts for general questions.

use async_trait::async_trait;
use ichika_config::WebSearchConfig;
use ichika_core::error::ToolError;
use ichika_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use tracing::debug;

pub const NO_WEB_RESULTS: &str = "No good DuckDuckGo Search Result was found";

const TOOL_NAME: &str = "web_search";
const MAX_RELATED_TOPICS: usize = 8;

pub struct WebSearchTool {
    api_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WebSearchTool {
    pub fn new(config: &WebSearchConfig, client: reqwest::Client, timeout_secs: u64) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    fn map_error(&self, e: reqwest::Error) -> ToolError {
        if e.is_timeout() {
            ToolError::Timeout {
                tool_name: TOOL_NAME.into(),
                timeout_secs: self.timeout_secs,
            }
        } else {
            ToolError::Backend {
                tool_name: TOOL_NAME.into(),
                reason: e.to_string(),
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    abstract_text: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a plain topic or a named group of topics.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn collect_topics<'a>(topics: &'a [RelatedTopic], out: &mut Vec<&'a str>) {
    for topic in topics {
        if out.len() >= MAX_RELATED_TOPICS {
            return;
        }
        match topic {
            RelatedTopic::Topic { text } if !text.trim().is_empty() => out.push(text),
            RelatedTopic::Topic { .. } => {}
            RelatedTopic::Group { topics } => collect_topics(topics, out),
        }
    }
}

impl InstantAnswer {
    fn render(&self) -> Option<String> {
        let mut parts: Vec<&str> = Vec::new();
        for text in [&self.abstract_text, &self.answer] {
            if !text.trim().is_empty() {
                parts.push(text);
            }
        }
        collect_topics(&self.related_topics, &mut parts);
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web with DuckDuckGo. Use this for general questions that are not about the circle."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let response = self
            .client
            .get(format!("{}/", self.api_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Backend {
                tool_name: TOOL_NAME.into(),
                reason: format!("DuckDuckGo returned {status}"),
            });
        }

        // DuckDuckGo sometimes answers with an empty body or a non-JSON content type
        let body = response.text().await.map_err(|e| self.map_error(e))?;
        let answer: InstantAnswer = if body.trim().is_empty() {
            InstantAnswer::default()
        } else {
            serde_json::from_str(&body).map_err(|e| ToolError::Backend {
                tool_name: TOOL_NAME.into(),
                reason: format!("Invalid DuckDuckGo response: {e}"),
            })?
        };

        match answer.render() {
            Some(text) => {
                debug!(chars = text.len(), "Web search finished");
                Ok(ToolResult::found(text))
            }
            None => Ok(ToolResult::empty(NO_WEB_RESULTS)),
        }
    }
}
