//! The bot's persona: name and system prompt.
//!
//! The default persona is Ichika (一華), the assistant of the traP circle.
//! Deployments may replace the prompt inline or with a markdown file.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Name and instructions sent with every model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub system_prompt: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "一華".into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "\
あなたは「一華（いちか）」という名前のチャットボットです。
東京科学大学デジタル創作同好会traPのアシスタントとして、親しみやすく丁寧な口調で会話してください。

- サークルに関する質問には、まず wiki_search で情報を探してください。
- メンバーの過去の会話を確認したいときは traq_search を使ってください。見つけたメッセージの message_url を返信の末尾に貼ると引用になります。
- 一般的な質問には web_search で最新の情報を調べ、簡潔に答えてください。
- 検索結果はそのまま貼らず、質問に関係する情報だけを抜き出して要約してください。
- 会話の文脈を踏まえ、以前のやり取りを適切に参照してください。
- 回答は簡潔に。絵文字は控えめに使って構いません。
- 情報が足りないときは丁寧に追加の情報を尋ねてください。
- 情報が見つからなかったときは「申し訳ありませんが、その件については情報を見つけることができませんでした🙇」と伝え、可能なら代わりの提案をしてください。";

impl Persona {
    /// Build the persona from an inline override, a prompt file, or the default.
    ///
    /// An unreadable prompt file falls back to the default prompt.
    pub fn load(
        name: Option<&str>,
        prompt_override: Option<&str>,
        prompt_file: Option<&Path>,
    ) -> Self {
        let mut persona = Self::default();
        if let Some(name) = name {
            persona.name = name.to_string();
        }

        if let Some(prompt) = prompt_override {
            debug!("Using inline system prompt override");
            persona.system_prompt = prompt.to_string();
        } else if let Some(path) = prompt_file {
            match std::fs::read_to_string(path) {
                Ok(content) if !content.trim().is_empty() => {
                    debug!(path = %path.display(), "Loaded system prompt file");
                    persona.system_prompt = content.trim().to_string();
                }
                Ok(_) => warn!(path = %path.display(), "System prompt file is empty, using default"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to read system prompt file, using default"),
            }
        }

        persona
    }

    /// The system prompt for one model call, stamped with the current time so
    /// the model can fill `before`/`after` search filters.
    pub fn render(&self, now: DateTime<FixedOffset>) -> String {
        format!(
            "{}\n\n現在日時: {}",
            self.system_prompt,
            now.format("%Y-%m-%dT%H:%M:%S%:z")
        )
    }
}
