//! Conversation memory for Ichika.

pub mod store;

pub use store::{SessionGuard, SessionStore};
