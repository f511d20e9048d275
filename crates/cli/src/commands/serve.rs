//! `ichika serve`: Start the traQ webhook server.

use std::path::Path;

use super::load_config;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("一華 (Ichika) webhook server");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Bot:       @{}", config.traq.bot_name);
    println!("   Model:     {} / {}", config.default_provider, config.default_model);

    ichika_gateway::start(config).await?;

    Ok(())
}
