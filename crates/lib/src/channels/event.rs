//! Slack Events API payload: decoded once per webhook, serialized as-is for the relay.

use serde::{Deserialize, Serialize};

/// Outer envelope `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// One-time endpoint ownership handshake.
    UrlVerification,
    /// A subscribed event; the payload is in `event`.
    EventCallback,
    /// Anything else (e.g. `app_rate_limited`). Kept verbatim so relay round-trips are lossless.
    Other(String),
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "url_verification" => EventKind::UrlVerification,
            "event_callback" => EventKind::EventCallback,
            _ => EventKind::Other(s),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::UrlVerification => "url_verification".to_string(),
            EventKind::EventCallback => "event_callback".to_string(),
            EventKind::Other(s) => s,
        }
    }
}

impl Default for EventKind {
    fn default() -> Self {
        EventKind::Other(String::new())
    }
}

/// Inner `event.type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InnerKind {
    Message,
    Other(String),
}

impl From<String> for InnerKind {
    fn from(s: String) -> Self {
        if s == "message" {
            InnerKind::Message
        } else {
            InnerKind::Other(s)
        }
    }
}

impl From<InnerKind> for String {
    fn from(kind: InnerKind) -> Self {
        match kind {
            InnerKind::Message => "message".to_string(),
            InnerKind::Other(s) => s,
        }
    }
}

impl Default for InnerKind {
    fn default() -> Self {
        InnerKind::Other(String::new())
    }
}

/// Slack webhook body (`event_callback` or `url_verification`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub api_app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<InnerEvent>,
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub event_time: i64,
    #[serde(default)]
    pub authed_users: Vec<String>,
    /// Present only on `url_verification`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
}

/// The `event` object of an `event_callback`.
///
/// Every subscribed event type lands here, and non-message events reuse these names with other
/// shapes (`team_join` has a `user` object, `channel_created` a `channel` object). Non-string
/// values read as absent; the acceptance filter drops those events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InnerEvent {
    #[serde(rename = "type", default)]
    pub kind: InnerKind,
    #[serde(default, deserialize_with = "lenient_string")]
    pub event_ts: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ts: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel_type: String,
    /// Set when the message was posted inside a thread.
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub thread_ts: Option<String>,
    /// Set on messages posted by bots, including this bridge's own replies.
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub bot_id: Option<String>,
    /// Set on edits, joins, bot messages and other non-plain messages.
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub subtype: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed event payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid event: {0}")]
    Invalid(&'static str),
}

/// A message that passed the acceptance filter: what to complete and where to reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedMessage {
    pub event_id: String,
    pub channel: String,
    pub text: String,
    /// Thread to reply in; None posts top-level.
    pub thread_ts: Option<String>,
}

/// Why an event was not handed to the completion step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilteredEvent {
    NotCallback(String),
    NoInnerEvent,
    NotMessage(String),
    FromBot,
    Subtype(String),
    NoChannel,
    NoText,
}

impl std::fmt::Display for FilteredEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilteredEvent::NotCallback(t) => write!(f, "event type {:?} is not event_callback", t),
            FilteredEvent::NoInnerEvent => write!(f, "event_callback without event"),
            FilteredEvent::NotMessage(t) => write!(f, "inner event type {:?} is not message", t),
            FilteredEvent::FromBot => write!(f, "message posted by a bot"),
            FilteredEvent::Subtype(s) => write!(f, "message subtype {}", s),
            FilteredEvent::NoChannel => write!(f, "message without channel"),
            FilteredEvent::NoText => write!(f, "message without text"),
        }
    }
}

/// Decode a webhook body. Empty (or all-whitespace) bodies are keep-alives and yield `Ok(None)`.
pub fn decode_event(body: &[u8]) -> Result<Option<MessageEvent>, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let event: MessageEvent = serde_json::from_slice(body)?;
    event.validate()?;
    Ok(Some(event))
}

impl MessageEvent {
    /// A verification request carries a challenge and no message; a callback never carries a challenge.
    pub fn validate(&self) -> Result<(), DecodeError> {
        match self.kind {
            EventKind::UrlVerification => {
                if self.challenge.is_none() {
                    return Err(DecodeError::Invalid("url_verification without challenge"));
                }
                if self.event.is_some() {
                    return Err(DecodeError::Invalid("url_verification with event"));
                }
            }
            EventKind::EventCallback => {
                if self.challenge.is_some() {
                    return Err(DecodeError::Invalid("event_callback with challenge"));
                }
            }
            EventKind::Other(_) => {}
        }
        Ok(())
    }

    /// Acceptance filter: only user-authored `message` callbacks with a channel and text pass.
    pub fn accept(&self) -> Result<AcceptedMessage, FilteredEvent> {
        if self.kind != EventKind::EventCallback {
            return Err(FilteredEvent::NotCallback(String::from(self.kind.clone())));
        }
        let inner = self.event.as_ref().ok_or(FilteredEvent::NoInnerEvent)?;
        if inner.kind != InnerKind::Message {
            return Err(FilteredEvent::NotMessage(String::from(inner.kind.clone())));
        }
        if inner.bot_id.is_some() {
            return Err(FilteredEvent::FromBot);
        }
        if let Some(ref subtype) = inner.subtype {
            return Err(FilteredEvent::Subtype(subtype.clone()));
        }
        if inner.channel.trim().is_empty() {
            return Err(FilteredEvent::NoChannel);
        }
        if inner.text.trim().is_empty() {
            return Err(FilteredEvent::NoText);
        }
        let thread_ts = inner
            .thread_ts
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| Some(inner.ts.clone()).filter(|t| !t.is_empty()));
        Ok(AcceptedMessage {
            event_id: self.event_id.clone(),
            channel: inner.channel.clone(),
            text: inner.text.clone(),
            thread_ts,
        })
    }
}

#[cfg(test)]
pub(crate) fn message_callback(text: &str) -> MessageEvent {
    MessageEvent {
        token: "tok".to_string(),
        team_id: "T1".to_string(),
        api_app_id: "A1".to_string(),
        event: Some(InnerEvent {
            kind: InnerKind::Message,
            event_ts: "1700000000.000100".to_string(),
            user: "U1".to_string(),
            text: text.to_string(),
            ts: "1700000000.000100".to_string(),
            channel: "C1".to_string(),
            channel_type: "channel".to_string(),
            thread_ts: None,
            bot_id: None,
            subtype: None,
        }),
        kind: EventKind::EventCallback,
        event_id: "Ev1".to_string(),
        event_time: 1_700_000_000,
        authed_users: vec!["U2".to_string()],
        challenge: None,
    }
}
