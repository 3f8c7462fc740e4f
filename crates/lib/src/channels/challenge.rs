//! Slack `url_verification` handshake: echo the challenge as plain text.

use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};

const URL_VERIFICATION: &str = "url_verification";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("url_verification without a string challenge")]
    MissingChallenge,
}

/// Outcome of inspecting a webhook body for the ownership handshake.
#[derive(Debug, PartialEq, Eq)]
pub enum Challenge {
    /// Not a handshake; continue with normal processing.
    NotHandled,
    /// Handshake answered with this token.
    Answered(String),
    /// Handshake with a missing or non-string challenge.
    Malformed(ChallengeError),
}

/// Inspect a raw body. Bodies that are not JSON objects are left for the event decoder.
pub fn check_challenge(method: &Method, body: &[u8]) -> Challenge {
    if *method != Method::POST {
        return Challenge::NotHandled;
    }
    let Ok(serde_json::Value::Object(map)) = serde_json::from_slice::<serde_json::Value>(body)
    else {
        return Challenge::NotHandled;
    };
    if map.get("type").and_then(|v| v.as_str()) != Some(URL_VERIFICATION) {
        return Challenge::NotHandled;
    }
    match map.get("challenge").and_then(|v| v.as_str()) {
        Some(token) => Challenge::Answered(token.to_string()),
        None => Challenge::Malformed(ChallengeError::MissingChallenge),
    }
}

impl Challenge {
    /// HTTP response for a handled handshake; None when processing should continue.
    pub fn respond(self) -> Option<Response> {
        match self {
            Challenge::NotHandled => None,
            Challenge::Answered(token) => Some(
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "text/plain")],
                    token,
                )
                    .into_response(),
            ),
            Challenge::Malformed(e) => {
                log::warn!("url_verification rejected: {}", e);
                Some(StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}
