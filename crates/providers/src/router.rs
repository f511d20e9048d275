//! Provider router: selects the model backend based on config.
//!
//! Handles provider creation and resolves which model name to send.

use crate::openai_compat::OpenAiCompatProvider;
use ichika_core::error::ProviderError;
use ichika_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes model requests to the configured backend.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    models: HashMap<String, String>,
    default_provider: String,
    default_model: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider and model.
    pub fn new(default_provider: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            models: HashMap::new(),
            default_provider: default_provider.into(),
            default_model: default_model.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Pin the model used with a provider.
    pub fn set_model(&mut self, provider: impl Into<String>, model: impl Into<String>) {
        self.models.insert(provider.into(), model.into());
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// The default provider together with the model to request from it.
    pub fn default_route(&self) -> Result<(Arc<dyn Provider>, String), ProviderError> {
        let provider = self.get(&self.default_provider).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "provider '{}' is not registered",
                self.default_provider
            ))
        })?;
        let model = self
            .models
            .get(&self.default_provider)
            .cloned()
            .unwrap_or_else(|| self.default_model.clone());
        Ok((provider, model))
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &ichika_config::AppConfig) -> Result<ProviderRouter, ProviderError> {
    let mut router = ProviderRouter::new(&config.default_provider, &config.default_model);
    let timeout = config.agent.model_timeout_secs;

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        let provider = OpenAiCompatProvider::new(name, base_url, api_key, timeout)?;
        router.register(name.clone(), Arc::new(provider));

        if let Some(model) = &provider_config.default_model {
            router.set_model(name.clone(), model.clone());
        }
    }

    // The default provider works without its own [providers.*] table
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&config.default_provider);
        let provider =
            OpenAiCompatProvider::new(&config.default_provider, base_url, api_key, timeout)?;
        router.register(config.default_provider.clone(), Arc::new(provider));
    }

    Ok(router)
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
