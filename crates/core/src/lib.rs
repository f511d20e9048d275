//! # Ichika Core
//!
//! Domain types, traits, and error definitions for the Ichika chat bot.
//! This crate has **no transport dependencies**; it defines the model that
//! the session store, the search tools, the providers and the orchestrator
//! all implement against.
//!
//! ## Layout
//!
//! - [`session`]: turns, sessions and session keys
//! - [`tool`]: the tool trait and the statically built registry
//! - [`provider`]: the model capability consumed by the orchestrator
//! - [`channel`]: inbound messages and the outbound delivery trait
//! - [`event`]: domain events for observers
//! - [`persona`]: the bot's name and system prompt

pub mod channel;
pub mod error;
pub mod event;
pub mod persona;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{Channel, InboundMessage};
pub use event::{DomainEvent, EventBus};
pub use persona::Persona;
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use session::{Role, Session, SessionKey, Turn};
pub use tool::{Tool, ToolInvocation, ToolRegistry, ToolResult};
