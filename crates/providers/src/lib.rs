//! Model backends for Ichika.
//!
//! All providers implement the `ichika_core::Provider` trait. Every backend
//! the bot talks to (Gemini, DeepSeek, OpenAI, OpenRouter, Ollama) exposes an
//! OpenAI-compatible `/chat/completions` endpoint, so one implementation
//! covers them; the router picks the endpoint from configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::ProviderRouter;
