//! Dispatch strategies for accepted webhook events: direct (detached turn) or queue (relay).

use crate::agent::Agent;
use crate::channels::MessageEvent;
use crate::config::DispatchMode;
use crate::relay::{enqueue, EnqueueError, EventQueue};
use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What happened to an accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A detached turn was started in this process.
    Spawned,
    /// Published to the relay topic under this message id.
    Queued(String),
}

/// Hands an accepted event to whatever completes and answers it.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn mode(&self) -> DispatchMode;

    /// Only enqueue failures are reported; direct turns fail (and log) after the webhook has been answered.
    async fn dispatch(&self, event: MessageEvent) -> Result<Dispatched, EnqueueError>;
}

/// Detached turns still running; drained on shutdown.
#[derive(Clone, Default)]
pub struct InFlight {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl InFlight {
    /// Spawn a task outside any request's cancellation scope and track it.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Wait up to `grace` for tracked tasks, then abort the rest. Returns how many were aborted.
    pub async fn drain(&self, grace: Duration) -> usize {
        let handles = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *tasks)
        };
        if handles.is_empty() {
            return 0;
        }
        log::info!("waiting up to {:?} for {} in-flight turn(s)", grace, handles.len());
        let deadline = tokio::time::Instant::now() + grace;
        let mut aborted = 0;
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            log::warn!("aborted {} in-flight turn(s) at shutdown", aborted);
        }
        aborted
    }
}

/// Complete and reply in this process, after the webhook response.
pub struct DirectDispatch {
    agent: Agent,
    in_flight: InFlight,
}

impl DirectDispatch {
    pub fn new(agent: Agent, in_flight: InFlight) -> Self {
        Self { agent, in_flight }
    }
}

#[async_trait]
impl Dispatcher for DirectDispatch {
    fn mode(&self) -> DispatchMode {
        DispatchMode::Direct
    }

    async fn dispatch(&self, event: MessageEvent) -> Result<Dispatched, EnqueueError> {
        let agent = self.agent.clone();
        self.in_flight.spawn(async move {
            agent.handle_event(&event).await;
        });
        Ok(Dispatched::Spawned)
    }
}

/// Publish to the relay topic; a consumer process answers.
pub struct QueueDispatch {
    queue: Arc<dyn EventQueue>,
}

impl QueueDispatch {
    pub fn new(queue: Arc<dyn EventQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Dispatcher for QueueDispatch {
    fn mode(&self) -> DispatchMode {
        DispatchMode::Queue
    }

    async fn dispatch(&self, event: MessageEvent) -> Result<Dispatched, EnqueueError> {
        let id = enqueue(self.queue.as_ref(), &event).await?;
        log::info!("event {} queued as message {}", event.event_id, id);
        Ok(Dispatched::Queued(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{FakeCompletion, FakeReplies};
    use crate::channels::message_callback;

    struct RecordingQueue {
        payloads: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventQueue for RecordingQueue {
        async fn publish(&self, payload: Vec<u8>) -> Result<String, EnqueueError> {
            if self.fail {
                return Err(EnqueueError::NoMessageId);
            }
            let mut p = self.payloads.lock().unwrap();
            p.push(payload);
            Ok(format!("msg-{}", p.len()))
        }
    }

    #[tokio::test]
    async fn direct_dispatch_runs_turn_detached() {
        let completion = FakeCompletion::replying("hi there");
        let replies = FakeReplies::new();
        let in_flight = InFlight::default();
        let agent = Agent::new(completion.clone(), replies.clone(), Duration::from_secs(5));
        let dispatcher = DirectDispatch::new(agent, in_flight.clone());

        let res = dispatcher.dispatch(message_callback("hello")).await.unwrap();
        assert_eq!(res, Dispatched::Spawned);
        assert_eq!(in_flight.drain(Duration::from_secs(5)).await, 0);
        assert_eq!(completion.prompts().len(), 1);
        assert_eq!(replies.posts().len(), 1);
    }

    #[tokio::test]
    async fn queue_dispatch_publishes_event_json() {
        let queue = Arc::new(RecordingQueue {
            payloads: Mutex::new(Vec::new()),
            fail: false,
        });
        let dispatcher = QueueDispatch::new(queue.clone());
        let event = message_callback("hello");

        let res = dispatcher.dispatch(event.clone()).await.unwrap();
        assert_eq!(res, Dispatched::Queued("msg-1".to_string()));
        let payloads = queue.payloads.lock().unwrap();
        let decoded: MessageEvent = serde_json::from_slice(&payloads[0]).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn queue_failure_is_reported() {
        let dispatcher = QueueDispatch::new(Arc::new(RecordingQueue {
            payloads: Mutex::new(Vec::new()),
            fail: true,
        }));
        assert!(dispatcher.dispatch(message_callback("hello")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_tasks_past_grace() {
        let in_flight = InFlight::default();
        in_flight.spawn(async {
            tokio::time::sleep(Duration::from_secs(600)).await;
        });
        in_flight.spawn(async {});
        tokio::task::yield_now().await;
        assert_eq!(in_flight.drain(Duration::from_secs(1)).await, 1);
        assert_eq!(in_flight.drain(Duration::from_secs(1)).await, 0);
    }
}
