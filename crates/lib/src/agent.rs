//! Agent turn: complete the message text, then post the completion as a reply.
//!
//! Shared by the direct dispatch path (detached task in the webhook process) and the relay consumer.
//! Completion always finishes before the reply is attempted.

use crate::channels::{AcceptedMessage, FilteredEvent, MessageEvent, PostError, ReplyPublisher};
use crate::llm::{CompletionClient, CompletionError, CompletionRequest};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Post(#[from] PostError),
    /// The turn deadline passed while posting; the reply may or may not have landed.
    #[error("posting reply exceeded the {0:?} turn deadline")]
    PostTimeout(Duration),
}

impl TurnError {
    /// True for completion failures a redelivery could fix. Post failures never qualify.
    pub fn is_transient_completion(&self) -> bool {
        match self {
            TurnError::Completion(e) => e.is_transient(),
            TurnError::Post(_) | TurnError::PostTimeout(_) => false,
        }
    }
}

/// Result of handling one event end to end.
#[derive(Debug)]
pub enum TurnOutcome {
    Replied,
    Filtered(FilteredEvent),
    Failed(TurnError),
}

/// Completion client + reply publisher, injected at startup.
#[derive(Clone)]
pub struct Agent {
    completion: Arc<dyn CompletionClient>,
    replies: Arc<dyn ReplyPublisher>,
    timeout: Duration,
}

impl Agent {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        replies: Arc<dyn ReplyPublisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            completion,
            replies,
            timeout,
        }
    }

    /// Filter, complete, reply. Failures are logged here and returned for callers that care (the relay consumer).
    pub async fn handle_event(&self, event: &MessageEvent) -> TurnOutcome {
        let msg = match event.accept() {
            Ok(m) => m,
            Err(reason) => {
                log::debug!("dropping event {}: {}", event.event_id, reason);
                return TurnOutcome::Filtered(reason);
            }
        };
        match self.run_turn(&msg).await {
            Ok(()) => TurnOutcome::Replied,
            Err(e) => {
                match e {
                    TurnError::Completion(ref err) => {
                        log::warn!("event {}: completion failed, no reply sent: {}", msg.event_id, err)
                    }
                    TurnError::Post(ref err) => {
                        log::warn!("event {}: posting reply to {} failed: {}", msg.event_id, msg.channel, err)
                    }
                    TurnError::PostTimeout(d) => {
                        log::warn!("event {}: reply to {} abandoned after {:?}", msg.event_id, msg.channel, d)
                    }
                }
                TurnOutcome::Failed(e)
            }
        }
    }

    /// Complete `msg.text` and post the result to `msg.channel` (threaded when `thread_ts` is set).
    ///
    /// Both stages share one turn deadline. Running out during completion is `CompletionError::Timeout`;
    /// running out during the post is `TurnError::PostTimeout`.
    pub async fn run_turn(&self, msg: &AcceptedMessage) -> Result<(), TurnError> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        log::info!("event {}: completing message from {}", msg.event_id, msg.channel);
        let req = CompletionRequest::new(msg.text.clone());
        let completion = tokio::time::timeout_at(deadline, self.completion.complete(req))
            .await
            .map_err(|_| CompletionError::Timeout)??;
        log::debug!("event {}: completion is {} bytes", msg.event_id, completion.text.len());

        let post = self
            .replies
            .post_reply(&msg.channel, &completion.text, msg.thread_ts.as_deref());
        tokio::time::timeout_at(deadline, post)
            .await
            .map_err(|_| TurnError::PostTimeout(self.timeout))??;
        log::info!("event {}: reply posted to {}", msg.event_id, msg.channel);
        Ok(())
    }

    /// One-off completion without a reply (CLI and the `/complete` endpoint).
    pub async fn complete_only(&self, text: &str, model: Option<String>) -> Result<String, TurnError> {
        let req = CompletionRequest::new(text).with_model(model);
        let res = tokio::time::timeout(self.timeout, self.completion.complete(req))
            .await
            .map_err(|_| CompletionError::Timeout)??;
        Ok(res.text)
    }
}
