//! Integration test: start the gateway from config on a free port, GET /, assert health JSON.
//! Upstream APIs are never called. The server task is left running when the test ends.

use bridge::config::Config;
use bridge::gateway;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = free_port();

    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.slack.signing_secret = Some("test-secret".to_string());
    config.slack.bot_token = Some("xoxb-test".to_string());
    config.completion.api_key = Some("sk-test".to_string());

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("mode").and_then(|v| v.as_str()), Some("direct"));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    gateway_handle.abort();
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn gateway_refuses_to_start_without_signing_secret() {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.slack.bot_token = Some("xoxb-test".to_string());
    config.completion.api_key = Some("sk-test".to_string());

    let err = gateway::run_gateway(config).await.unwrap_err();
    assert!(err.to_string().contains("signing secret"));
}

#[tokio::test]
async fn completion_endpoint_on_public_bind_needs_token() {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.gateway.bind = "0.0.0.0".to_string();
    config.gateway.completion_endpoint = true;
    config.slack.signing_secret = Some("test-secret".to_string());
    config.completion.api_key = Some("sk-test".to_string());

    let err = gateway::run_gateway(config).await.unwrap_err();
    assert!(err.to_string().contains("/complete"));
}
