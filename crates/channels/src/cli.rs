//! CLI channel: interactive terminal-based chat.
//!
//! Reads questions from stdin, writes answers to stdout.
//! Used for `ichika chat`.

use async_trait::async_trait;
use ichika_core::channel::{Channel, InboundMessage};
use ichika_core::error::ChannelError;
use ichika_core::session::SessionKey;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    session_key: SessionKey,
}

impl CliChannel {
    /// All console input shares the session `cli:<debug_user_id>`.
    pub fn new(debug_user_id: &str) -> Self {
        Self {
            session_key: SessionKey::new(format!("cli:{debug_user_id}")),
        }
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    /// Start reading stdin.
    pub fn start(&self) -> mpsc::Receiver<Result<InboundMessage, ChannelError>> {
        self.start_with_reader(BufReader::new(io::stdin()))
    }

    /// Start reading questions from `reader`, one per line.
    ///
    /// Empty lines are skipped; `exit` or `quit` (any case) and EOF end the
    /// stream.
    pub fn start_with_reader<R>(&self, reader: R) -> mpsc::Receiver<Result<InboundMessage, ChannelError>>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        let session_key = self.session_key.clone();

        tokio::spawn(async move {
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if is_exit_command(line) {
                            break;
                        }

                        let msg = InboundMessage::local(line, session_key.clone());
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        rx
    }
}

fn is_exit_command(line: &str) -> bool {
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn send(&self, _channel_id: &str, content: &str) -> Result<(), ChannelError> {
        println!("{content}");
        Ok(())
    }
}
