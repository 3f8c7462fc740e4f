//! Relay consumer: one call per delivered message; decide whether to acknowledge.

use crate::agent::{Agent, TurnOutcome};
use crate::relay::wire::RelayMessage;

/// Acknowledgement policy for failed turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Always acknowledge; failed events are logged and dropped.
    #[default]
    AckAll,
    /// Ask for redelivery when the completion provider failed transiently.
    RedeliverTransient,
}

/// What to tell the queue about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Ack,
    Redeliver,
}

/// Decode, re-filter, complete, reply. The acceptance filter runs again here; the producer is not trusted to have applied it.
pub async fn handle_delivery(agent: &Agent, msg: &RelayMessage, policy: FailurePolicy) -> Delivery {
    let event = match msg.decode_event() {
        Ok(e) => e,
        Err(e) => {
            log::warn!("relay message {}: undecodable payload, acknowledging: {}", msg.message_id, e);
            return Delivery::Ack;
        }
    };
    match agent.handle_event(&event).await {
        TurnOutcome::Replied | TurnOutcome::Filtered(_) => Delivery::Ack,
        TurnOutcome::Failed(e) => {
            if policy == FailurePolicy::RedeliverTransient && e.is_transient_completion() {
                log::info!("relay message {}: requesting redelivery", msg.message_id);
                Delivery::Redeliver
            } else {
                Delivery::Ack
            }
        }
    }
}
