//! traP wiki search: HTTP client and the `wiki_search` tool.

use async_trait::async_trait;
use ichika_config::WikiConfig;
use ichika_core::error::ToolError;
use ichika_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use tracing::{debug, warn};

pub const NO_PAGES_FOUND: &str = "申し訳ありませんが、Wikiに関連する情報が見つかりませんでした。";

const TOOL_NAME: &str = "wiki_search";

/// Errors from the wiki search API.
#[derive(Debug, thiserror::Error)]
pub enum WikiError {
    #[error("wiki returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("wiki request timed out")]
    Timeout,

    #[error("wiki request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for WikiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            WikiError::Timeout
        } else {
            WikiError::Request(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikiSearchResponse {
    #[serde(default)]
    pub meta: Option<WikiSearchMeta>,
    #[serde(default)]
    pub data: Vec<WikiPage>,
    #[serde(default)]
    pub ok: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikiSearchMeta {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub results: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikiPage {
    pub path: String,
    pub revision: WikiRevision,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikiRevision {
    #[serde(default)]
    pub body: String,
}

/// Client for `GET <wiki>/_api/search`.
pub struct WikiClient {
    base_url: String,
    access_token: Option<String>,
    user: String,
    client: reqwest::Client,
}

impl WikiClient {
    pub fn new(config: &WikiConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            user: config.user.clone(),
            client,
        }
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<WikiSearchResponse, WikiError> {
        let url = format!("{}/_api/search", self.base_url);
        let limit = limit.to_string();
        let mut params = vec![("q", query), ("limit", limit.as_str())];
        if let Some(token) = &self.access_token {
            params.push(("access_token", token.as_str()));
        }
        params.push(("user", self.user.as_str()));

        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Wiki search failed");
            return Err(WikiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Searches the traP wiki for circle information.
pub struct WikiSearchTool {
    client: WikiClient,
    limit: u32,
    max_body_chars: usize,
    timeout_secs: u64,
}

impl WikiSearchTool {
    pub fn new(config: &WikiConfig, client: reqwest::Client, timeout_secs: u64) -> Self {
        Self {
            client: WikiClient::new(config, client),
            limit: config.limit,
            max_body_chars: config.max_body_chars,
            timeout_secs,
        }
    }

    fn render(&self, pages: &[WikiPage]) -> String {
        let mut out = String::from("以下がWikiで見つかった情報です：\n\n");
        for page in pages {
            out.push_str(&format!("タイトル: {}\n", page.path));
            out.push_str(&format!(
                "内容: {}\n\n",
                truncate_chars(&page.revision.body, self.max_body_chars)
            ));
        }
        out.trim_end().to_string()
    }
}

/// The first `max_chars` characters of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Tool for WikiSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "traP Wikiで情報を検索します。サークル内の情報を探す際に使用してください。"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "検索クエリ"
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
            .search(query, self.limit)
            .await
            .map_err(|e| match e {
                WikiError::Timeout => ToolError::Timeout {
                    tool_name: TOOL_NAME.into(),
                    timeout_secs: self.timeout_secs,
                },
                other => ToolError::Backend {
                    tool_name: TOOL_NAME.into(),
                    reason: other.to_string(),
                },
            })?;

        debug!(pages = response.data.len(), "Wiki search finished");

        if response.data.is_empty() {
            return Ok(ToolResult::empty(NO_PAGES_FOUND));
        }
        let pages = &response.data[..response.data.len().min(self.limit as usize)];
        Ok(ToolResult::found(self.render(pages)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool(server: &MockServer, max_body_chars: usize) -> WikiSearchTool {
        let config = WikiConfig {
            api_url: server.uri(),
            access_token: Some("wiki-token".into()),
            max_body_chars,
            ..WikiConfig::default()
        };
        WikiSearchTool::new(&config, reqwest::Client::new(), 20)
    }

    fn page(path: &str, body: &str) -> serde_json::Value {
        json!({
            "_id": "p1",
            "_score": 1.5,
            "path": path,
            "status": "published",
            "revision": {"_id": "r1", "format": "markdown", "path": path, "body": body}
        })
    }

    #[tokio::test]
    async fn search_sends_expected_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_api/search"))
            .and(query_param("q", "部室"))
            .and(query_param("limit", "5"))
            .and(query_param("access_token", "wiki-token"))
            .and(query_param("user", "trasta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"took": 3, "total": 1, "results": 1},
                "data": [page("/general/部室", "部室は本館の2階です")],
                "ok": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = tool(&server, 2000).execute(json!({"query": "部室"})).await.unwrap();
        assert!(result.found);
        assert_eq!(
            result.output,
            "以下がWikiで見つかった情報です：\n\nタイトル: /general/部室\n内容: 部室は本館の2階です"
        );
    }

    #[tokio::test]
    async fn long_bodies_are_truncated_on_char_boundary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [page("/p", "あいうえおかきくけこ")],
                "ok": true
            })))
            .mount(&server)
            .await;

        let result = tool(&server, 3).execute(json!({"query": "x"})).await.unwrap();
        assert!(result.output.ends_with("内容: あいう"));
    }

    #[tokio::test]
    async fn zero_hits_returns_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [], "ok": true})))
            .mount(&server)
            .await;

        let result = tool(&server, 2000).execute(json!({"query": "x"})).await.unwrap();
        assert!(!result.found);
        assert_eq!(result.output, NO_PAGES_FOUND);
    }

    #[tokio::test]
    async fn backend_errors_and_bad_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tool = tool(&server, 2000);
        let err = tool.execute(json!({"query": "x"})).await.unwrap_err();
        assert!(matches!(err, ToolError::Backend { .. }));

        let err = tool.execute(json!({"q": "x"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("部室です", 2), "部室");
        assert_eq!(truncate_chars("", 0), "");
    }
}
