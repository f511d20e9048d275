pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod serve;

use ichika_agent::Orchestrator;
use ichika_channels::TraqClient;
use ichika_channels::traq::api::DEFAULT_TIMEOUT_SECS;
use ichika_config::AppConfig;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load(path).map_err(|e| format!("Failed to load config: {e}").into())
}

/// Orchestrator for console use: same model, tools and persona as the
/// server, without requiring the webhook secrets.
pub fn local_orchestrator(config: &AppConfig) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ICHIKA_API_KEY=...   (generic)");
        eprintln!("    GEMINI_API_KEY=...   (default provider)");
        eprintln!("    OPENAI_API_KEY=...");
        eprintln!();
        eprintln!("  Or add api_key to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = ichika_providers::router::build_from_config(config)?;
    let (provider, model) = router.default_route()?;

    let traq = match TraqClient::from_config(&config.traq) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "traq_search will fail until BOT_ACCESS_TOKEN is set");
            TraqClient::new(&config.traq.api_url, "", DEFAULT_TIMEOUT_SECS)?
        }
    };
    let tools = ichika_tools::default_registry(config, Arc::new(traq))?;

    Ok(Orchestrator::from_config(config, provider, model, Arc::new(tools)))
}
