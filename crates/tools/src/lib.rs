//! Knowledge search tools for Ichika.
//!
//! Tools give the model access to what the circle knows:
//! past traQ conversations, the traP wiki, and the public web.

pub mod traq_search;
pub mod web_search;
pub mod wiki;

use ichika_channels::TraqClient;
use ichika_config::AppConfig;
use ichika_core::error::ToolError;
use ichika_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

pub use traq_search::MessageSearchTool;
pub use web_search::WebSearchTool;
pub use wiki::{WikiClient, WikiSearchTool};

/// Create the tool registry from configuration.
///
/// The traQ client is shared with answer delivery. Web search is left out
/// when `[web_search] enabled = false`.
pub fn default_registry(config: &AppConfig, traq: Arc<TraqClient>) -> Result<ToolRegistry, ToolError> {
    let timeout_secs = config.agent.tool_timeout_secs;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ToolError::Backend {
            tool_name: "http".into(),
            reason: e.to_string(),
        })?;

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(MessageSearchTool::new(traq, &config.traq, timeout_secs)));
    registry.register(Box::new(WikiSearchTool::new(&config.wiki, http.clone(), timeout_secs)));
    if config.web_search.enabled {
        registry.register(Box::new(WebSearchTool::new(&config.web_search, http, timeout_secs)));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traq() -> Arc<TraqClient> {
        Arc::new(TraqClient::new("http://localhost:1", "t", 5).unwrap())
    }

    #[test]
    fn registry_has_all_tools() {
        let registry = default_registry(&AppConfig::default(), traq()).unwrap();
        assert_eq!(registry.names(), vec!["traq_search", "web_search", "wiki_search"]);

        let defs = registry.definitions();
        assert!(defs.iter().all(|d| d.parameters["required"][0] == "query"));
    }

    #[test]
    fn web_search_can_be_disabled() {
        let mut config = AppConfig::default();
        config.web_search.enabled = false;
        let registry = default_registry(&config, traq()).unwrap();
        assert_eq!(registry.names(), vec!["traq_search", "wiki_search"]);
    }
}
