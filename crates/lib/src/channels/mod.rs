//! Messaging platform side (Slack).
//!
//! Webhook authenticity, the url_verification handshake, event decoding and filtering,
//! and the reply publisher used to post completions back into a conversation.

mod challenge;
mod event;
mod reply;
mod signature;
mod slack;

pub use challenge::{check_challenge, Challenge, ChallengeError};
pub use event::{
    decode_event, AcceptedMessage, DecodeError, EventKind, FilteredEvent, InnerEvent, InnerKind,
    MessageEvent,
};
pub use reply::{PostError, ReplyPublisher};
pub use signature::{
    AuthError, SignatureVerifier, MAX_REQUEST_AGE_SECS, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
pub use slack::SlackChannel;

#[cfg(test)]
pub(crate) use event::message_callback;
