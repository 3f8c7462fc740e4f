//! Shared helpers for the HTTP integration tests: fake upstream APIs, signed requests, a server on a free port.

#![allow(dead_code)]

use axum::Router;
use bridge::agent::Agent;
use bridge::channels::{SignatureVerifier, SlackChannel, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use bridge::llm::OpenAiClient;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

/// Serve `app` on 127.0.0.1 with an OS-assigned port; returns the base URL.
/// The server task is left running when the test ends.
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Agent wired to fake OpenAI and Slack servers.
pub fn agent(openai: &MockServer, slack: &MockServer) -> Agent {
    let completion = OpenAiClient::new(
        Some("sk-test".to_string()),
        Some(openai.uri()),
        "gpt-4".to_string(),
        Duration::from_secs(5),
    );
    let replies = SlackChannel::new(
        Some("xoxb-test".to_string()),
        Some(slack.uri()),
        Duration::from_secs(5),
    );
    Agent::new(Arc::new(completion), Arc::new(replies), Duration::from_secs(10))
}

pub async fn mock_completion(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })))
        .mount(server)
        .await;
}

pub async fn mock_slack_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "1.2" })))
        .mount(server)
        .await;
}

/// JSON bodies of every request a fake server received.
pub async fn bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
        .collect()
}

pub fn message_event(text: &str) -> Value {
    json!({
        "token": "verification-token",
        "team_id": "T1",
        "api_app_id": "A1",
        "type": "event_callback",
        "event_id": "Ev1",
        "event_time": 1700000000,
        "authed_users": ["U0"],
        "event": {
            "type": "message",
            "user": "U1",
            "text": text,
            "ts": "1700000000.000100",
            "event_ts": "1700000000.000100",
            "channel": "C1",
            "channel_type": "channel"
        }
    })
}

/// POST `body` with a valid signature for `SECRET` and the current time.
pub async fn post_signed(url: &str, body: &[u8]) -> reqwest::Response {
    let ts = chrono::Utc::now().timestamp().to_string();
    post_signed_at(url, body, &ts).await
}

pub async fn post_signed_at(url: &str, body: &[u8], ts: &str) -> reqwest::Response {
    let signature = SignatureVerifier::new(SECRET).signature_header(ts, body);
    reqwest::Client::new()
        .post(url)
        .header(TIMESTAMP_HEADER, ts)
        .header(SIGNATURE_HEADER, signature)
        .header("content-type", "application/json")
        .body(body.to_vec())
        .send()
        .await
        .expect("send request")
}
