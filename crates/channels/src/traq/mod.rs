//! traQ integration.

pub mod api;
pub mod channel;
pub mod event;

pub use api::{MessageSearchQuery, MessageSearchResult, SearchSort, TraqApiError, TraqClient, TraqMessage};
pub use channel::TraqChannel;
pub use event::{MessageCreatedPayload, TraqIngress, WebhookEvent};
