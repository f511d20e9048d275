//! `ichika chat`: Interactive console chat.

use ichika_agent::Orchestrator;
use ichika_channels::CliChannel;
use ichika_core::channel::{Channel, InboundMessage};
use ichika_core::error::ChannelError;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;

use super::{load_config, local_orchestrator};

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let agent = local_orchestrator(&config)?;
    let channel = CliChannel::new(&config.cli.debug_user_id);

    println!();
    println!("  一華 (Ichika) - interactive mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Session:   {}", channel.session_key());
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let rx = channel.start();
    converse(&agent, &channel, rx).await?;

    println!();
    println!("  またね！👋");
    println!();
    Ok(())
}

/// Answer every message from `rx` in order until the input ends.
///
/// Returns how many answers were delivered.
pub async fn converse(
    agent: &Orchestrator,
    channel: &dyn Channel,
    mut rx: mpsc::Receiver<Result<InboundMessage, ChannelError>>,
) -> Result<usize, ChannelError> {
    let mut answered = 0;
    prompt();

    while let Some(result) = rx.recv().await {
        let message = result?;
        let outcome = agent.process(&message).await;
        if outcome.should_reply() {
            let text: Vec<String> = outcome.text.lines().map(|l| format!("  一華 > {l}")).collect();
            channel.send(&message.channel_id, &format!("\n{}\n", text.join("\n"))).await?;
            answered += 1;
        }
        prompt();
    }

    Ok(answered)
}

fn prompt() {
    print!("  You > ");
    let _ = std::io::stdout().flush();
}
