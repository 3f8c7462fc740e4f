//! Relay wire form: the JSON-encoded event as an opaque payload, and the Pub/Sub push envelope.

use crate::channels::{decode_event, DecodeError, MessageEvent};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

/// One queued event as delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// JSON-serialized [`MessageEvent`].
    pub data: Vec<u8>,
    /// Provider-assigned delivery id.
    pub message_id: String,
}

impl RelayMessage {
    /// Payload bytes for an event.
    pub fn encode(event: &MessageEvent) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(event)
    }

    /// Decode the payload back into an event. An empty payload is an error here: nothing legitimate publishes one.
    pub fn decode_event(&self) -> Result<MessageEvent, DecodeError> {
        decode_event(&self.data)?.ok_or(DecodeError::Invalid("empty relay payload"))
    }
}

/// Body of a Pub/Sub push delivery.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Deserialize)]
pub struct PushMessage {
    /// Base64 payload.
    #[serde(default)]
    pub data: String,
    /// Push bodies carry both `messageId` and `message_id`; only the former is read.
    #[serde(rename = "messageId", default)]
    pub message_id: String,
}

impl TryFrom<PushEnvelope> for RelayMessage {
    type Error = base64::DecodeError;

    fn try_from(envelope: PushEnvelope) -> Result<Self, Self::Error> {
        let data = STANDARD.decode(envelope.message.data.trim())?;
        Ok(RelayMessage {
            data,
            message_id: envelope.message.message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::message_callback;

    #[test]
    fn event_round_trips_through_relay_form() {
        let mut event = message_callback("hello");
        event.event.as_mut().unwrap().thread_ts = Some("1699999999.000001".to_string());
        let msg = RelayMessage {
            data: RelayMessage::encode(&event).unwrap(),
            message_id: "42".to_string(),
        };
        assert_eq!(msg.decode_event().unwrap(), event);
    }

    #[test]
    fn push_envelope_is_base64_decoded() {
        let event = message_callback("hello");
        let payload = STANDARD.encode(RelayMessage::encode(&event).unwrap());
        let body = serde_json::json!({
            "message": {
                "data": payload,
                "messageId": "2070443601311540",
                "publishTime": "2021-02-26T19:13:55.749Z"
            },
            "subscription": "projects/p/subscriptions/s"
        });
        let envelope: PushEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(envelope.subscription, "projects/p/subscriptions/s");
        let msg = RelayMessage::try_from(envelope).unwrap();
        assert_eq!(msg.message_id, "2070443601311540");
        assert_eq!(msg.decode_event().unwrap(), event);
    }

    #[test]
    fn bad_base64_and_empty_payload_are_rejected() {
        let envelope: PushEnvelope =
            serde_json::from_str(r#"{"message":{"data":"***","messageId":"1"}}"#).unwrap();
        assert!(RelayMessage::try_from(envelope).is_err());

        let empty = RelayMessage {
            data: Vec::new(),
            message_id: "1".to_string(),
        };
        assert!(matches!(empty.decode_event(), Err(DecodeError::Invalid(_))));
    }

    #[test]
    fn envelope_with_snake_and_camel_ids_parses() {
        let envelope: PushEnvelope = serde_json::from_str(
            r#"{"message":{"data":"e30=","messageId":"9","message_id":"9","publishTime":"t","publish_time":"t"},"subscription":"s"}"#,
        )
        .unwrap();
        let msg = RelayMessage::try_from(envelope).unwrap();
        assert_eq!(msg.message_id, "9");
        assert_eq!(msg.data, b"{}");
    }
}
