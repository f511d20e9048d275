//! traQ message search tool: lets the model read past conversations.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use ichika_channels::traq::{MessageSearchQuery, SearchSort, TraqApiError, TraqClient, TraqMessage};
use ichika_config::{MAX_SEARCH_LIMIT, TraqConfig};
use ichika_core::error::ToolError;
use ichika_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub const NO_MESSAGES_FOUND: &str = "申し訳ありませんが、関連するメッセージが見つかりませんでした。";

const TOOL_NAME: &str = "traq_search";

pub struct MessageSearchTool {
    client: Arc<TraqClient>,
    web_url: String,
    limit: u32,
    display_offset: FixedOffset,
    timeout_secs: u64,
}

impl MessageSearchTool {
    pub fn new(client: Arc<TraqClient>, config: &TraqConfig, timeout_secs: u64) -> Self {
        let display_offset = FixedOffset::east_opt(config.display_utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        Self {
            client,
            web_url: config.web_url.trim_end_matches('/').to_string(),
            limit: config.search_limit.min(MAX_SEARCH_LIMIT),
            display_offset,
            timeout_secs,
        }
    }

    fn render(&self, hits: &[TraqMessage]) -> String {
        let mut out = String::from("以下がtraQで見つかったメッセージです：\n\n");
        for msg in hits {
            let posted = msg.created_at.with_timezone(&self.display_offset);
            out.push_str(&format!("投稿日時: {}\n", posted.format("%Y-%m-%d %H:%M")));
            out.push_str(&format!("message_url: {}/messages/{}\n", self.web_url, msg.id));
            out.push_str(&format!("内容: {}\n\n", msg.content));
        }
        out.trim_end().to_string()
    }
}

/// Which end of the history to start from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SortArg {
    #[default]
    Newest,
    Oldest,
}

impl From<SortArg> for SearchSort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Newest => SearchSort::CreatedAtDesc,
            SortArg::Oldest => SearchSort::CreatedAtAsc,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Args {
    query: String,
    #[serde(default)]
    sort: SortArg,
    #[serde(default)]
    before: Option<String>,
    #[serde(default)]
    after: Option<String>,
}

fn parse_time(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ToolError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            DateTime::parse_from_rfc3339(v.trim())
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| ToolError::InvalidArguments(format!("'{field}' is not RFC 3339 ({v}): {e}")))
        })
        .transpose()
}

#[async_trait]
impl Tool for MessageSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "traQの過去メッセージを検索します。サークルメンバーの会話履歴を確認する際に使用してください。\
         結果の message_url を返信の末尾に貼ると、そのメッセージを引用できます。"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "検索するワード"
                },
                "sort": {
                    "type": "string",
                    "enum": ["newest", "oldest"],
                    "description": "newest: 作成日が新しい順 (default), oldest: 作成日が古い順",
                    "default": "newest"
                },
                "before": {
                    "type": "string",
                    "description": "この日時以前の投稿を検索 (RFC 3339, e.g. 2024-01-31T00:00:00Z)"
                },
                "after": {
                    "type": "string",
                    "description": "この日時以降の投稿を検索 (RFC 3339, e.g. 2024-01-01T00:00:00Z)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: Args = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let query = MessageSearchQuery {
            word: Some(args.query),
            before: parse_time("before", args.before.as_deref())?,
            after: parse_time("after", args.after.as_deref())?,
            bot: Some(false),
            limit: Some(self.limit),
            offset: Some(0),
            sort: Some(args.sort.into()),
            ..MessageSearchQuery::default()
        };

        let result = self
            .client
            .search_messages(&query)
            .await
            .map_err(|e| match e {
                TraqApiError::Timeout => ToolError::Timeout {
                    tool_name: TOOL_NAME.into(),
                    timeout_secs: self.timeout_secs,
                },
                other => ToolError::Backend {
                    tool_name: TOOL_NAME.into(),
                    reason: other.to_string(),
                },
            })?;

        debug!(hits = result.hits.len(), total = result.total_hits, "traQ search finished");

        if result.hits.is_empty() {
            return Ok(ToolResult::empty(NO_MESSAGES_FOUND));
        }
        let shown = result.hits.len().min(self.limit as usize);
        Ok(ToolResult::found(self.render(&result.hits[..shown])))
    }
}
