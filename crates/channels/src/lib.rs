//! Chat channel implementations for Ichika.
//!
//! Channels connect the bot to where questions come from and where answers
//! go. Available channels:
//! - **traQ**: REST client, webhook event model and `TraqChannel` delivery
//! - **CLI**: Interactive terminal chat (stdin/stdout)

pub mod cli;
pub mod traq;

pub use cli::CliChannel;
pub use traq::{TraqApiError, TraqChannel, TraqClient, TraqIngress};
