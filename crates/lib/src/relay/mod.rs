//! Relay: optional queue hop between webhook receipt and completion + reply.
//!
//! The webhook process publishes accepted events to Pub/Sub; a consumer process receives
//! push deliveries and runs the agent turn.

mod consumer;
mod publisher;
mod token;
mod wire;

pub use consumer::{handle_delivery, Delivery, FailurePolicy};
pub use publisher::{enqueue, EnqueueError, EventQueue, PubSubPublisher};
pub use token::{MetadataToken, TokenSource};
pub use wire::{PushEnvelope, PushMessage, RelayMessage};
