//! `ichika ask`: Answer one question and exit.

use ichika_core::channel::InboundMessage;
use std::path::Path;

use super::{load_config, local_orchestrator};

pub async fn run(config_path: Option<&Path>, question: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let agent = local_orchestrator(&config)?;

    let key = format!("cli:{}", config.cli.debug_user_id);
    let message = InboundMessage::local(question.trim(), key.as_str().into());

    eprint!("  Thinking...");
    let outcome = agent.process(&message).await;
    eprint!("\r              \r");
    println!("{}", outcome.text);

    Ok(())
}
