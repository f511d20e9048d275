//! `ichika config`: Configuration management commands.

use ichika_config::AppConfig;
use std::path::{Path, PathBuf};

const REDACTED: &str = "[REDACTED]";

fn resolve(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn init(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve(config_path);
    write_default(&path, force)?;
    println!("✅ Wrote default configuration to {}", path.display());
    println!("   Set BOT_ACCESS_TOKEN, BOT_VERIFICATION_TOKEN and an API key before `ichika serve`.");
    Ok(())
}

fn write_default(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(())
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

/// Replace every secret that is set with a placeholder.
fn redacted(mut config: AppConfig) -> AppConfig {
    let mask = |secret: &mut Option<String>| {
        if secret.is_some() {
            *secret = Some(REDACTED.into());
        }
    };
    mask(&mut config.api_key);
    for provider in config.providers.values_mut() {
        mask(&mut provider.api_key);
    }
    mask(&mut config.traq.bot_access_token);
    mask(&mut config.traq.verification_token);
    mask(&mut config.wiki.access_token);
    config
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", resolve(config_path).display());
}

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if !config.has_api_key() && config.default_provider != "ollama" {
        warnings.push("No model API key set (ICHIKA_API_KEY, GEMINI_API_KEY or OPENAI_API_KEY)".to_string());
    }
    if let Err(e) = config.require_server_secrets() {
        warnings.push(format!("`ichika serve` will not start: {e}"));
    }
    if config.wiki.access_token.is_none() {
        warnings.push("WIKI_TOKEN is not set; wiki_search only sees public pages".to_string());
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:  {}", config.default_provider);
    println!("   Model:     {}", config.default_model);
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Bot:       @{}", config.traq.bot_name);
    println!("   Sessions:  {:?} scope", config.traq.session_scope);
    println!("   Tool calls per message: {}", config.agent.max_tool_calls);

    Ok(())
}
