//! Reply target: post text back into a conversation.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("post request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("post rejected with http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("post rejected by platform: {0}")]
    Api(String),
    #[error("bot token not configured")]
    NoToken,
}

/// Posts replies into a channel, optionally inside a thread.
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    /// Post `text` to `channel`. With `thread_ts` the message is a threaded reply, otherwise top-level.
    async fn post_reply(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), PostError>;
}
