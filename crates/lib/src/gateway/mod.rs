//! Gateway: the HTTP processes.
//!
//! The webhook server receives Slack events and dispatches accepted messages either
//! directly (detached turn in this process) or to the relay topic. The consumer server
//! receives relay push deliveries and runs the turn.

mod consumer;
mod dispatch;
mod server;

pub use consumer::{consumer_router, run_consumer, ConsumerState};
pub use dispatch::{DirectDispatch, Dispatched, Dispatcher, InFlight, QueueDispatch};
pub use server::{build_agent, router, run_gateway, WebhookState};
