//! Slack Web API client for replies (chat.postMessage).

use crate::channels::reply::{PostError, ReplyPublisher};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

/// Slack answers 200 for most failures and reports them in the body.
#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// Slack connector used to post completions back into the originating channel.
#[derive(Clone)]
pub struct SlackChannel {
    api_base: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(token: Option<String>, api_base: Option<String>, timeout: Duration) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            api_base,
            token,
            client,
        }
    }

    /// Send a text message via chat.postMessage. Returns the posted message ts.
    pub async fn send_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<Option<String>, PostError> {
        let token = self.token.as_ref().ok_or(PostError::NoToken)?;
        let url = format!("{}/chat.postMessage", self.api_base);
        let body = PostMessageRequest {
            channel,
            text,
            thread_ts,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(PostError::Http { status, body });
        }
        let data: PostMessageResponse = res.json().await?;
        if !data.ok {
            return Err(PostError::Api(
                data.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        Ok(data.ts)
    }
}

#[async_trait]
impl ReplyPublisher for SlackChannel {
    async fn post_reply(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), PostError> {
        let ts = self.send_message(channel, text, thread_ts).await?;
        log::debug!("slack: posted reply to {} (ts {:?})", channel, ts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer) -> SlackChannel {
        SlackChannel::new(
            Some("xoxb-test".to_string()),
            Some(format!("{}/api/", server.uri())),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn threaded_reply_includes_thread_ts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_json(json!({
                "channel": "C1",
                "text": "hi there",
                "thread_ts": "1700000000.000100"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "ts": "1700000001.000200"
            })))
            .expect(1)
            .mount(&server)
            .await;

        channel(&server)
            .post_reply("C1", "hi there", Some("1700000000.000100"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn top_level_reply_omits_thread_ts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .and(body_json(json!({ "channel": "C1", "text": "hi there" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        channel(&server)
            .post_reply("C1", "hi there", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ok_false_is_post_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error": "invalid_auth"
            })))
            .mount(&server)
            .await;

        let err = channel(&server)
            .post_reply("C1", "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PostError::Api(ref e) if e == "invalid_auth"));
    }

    #[tokio::test]
    async fn http_failure_is_post_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = channel(&server)
            .post_reply("C1", "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PostError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn missing_token_fails_without_request() {
        let slack = SlackChannel::new(None, None, Duration::from_secs(1));
        assert!(matches!(
            slack.post_reply("C1", "hi", None).await,
            Err(PostError::NoToken)
        ));
    }
}
