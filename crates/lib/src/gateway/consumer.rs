//! Relay consumer HTTP server: Pub/Sub push deliveries in, agent turns out.

use crate::agent::Agent;
use crate::config::{self, Config};
use crate::gateway::server::{build_agent, shutdown_signal};
use crate::relay::{handle_delivery, Delivery, FailurePolicy, PushEnvelope, RelayMessage};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct ConsumerState {
    pub agent: Agent,
    pub policy: FailurePolicy,
    /// When Some, deliveries must carry `?token=<value>`.
    pub push_token: Option<String>,
    pub port: u16,
}

pub fn consumer_router(state: ConsumerState, push_path: &str) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route(push_path, post(relay_push))
        .with_state(state)
}

/// Run the consumer on config.gateway.bind:port. `port` overrides relay.consumerPort.
pub async fn run_consumer(config: Config, port: Option<u16>) -> Result<()> {
    let agent = build_agent(&config, true)?;
    let policy = if config.relay.redeliver_transient_failures {
        FailurePolicy::RedeliverTransient
    } else {
        FailurePolicy::AckAll
    };
    let push_token = config
        .relay
        .push_token
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    if push_token.is_none() && !config::is_loopback_bind(&config.gateway.bind) {
        log::warn!("relay consumer accepts unauthenticated pushes (relay.pushToken not set)");
    }
    let port = port.unwrap_or(config.relay.consumer_port);
    let state = ConsumerState {
        agent,
        policy,
        push_token,
        port,
    };
    let app = consumer_router(state, &config.relay.push_path);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "relay consumer listening on {} (push path {}, {:?})",
        bind_addr,
        config.relay.push_path,
        policy
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay consumer exited")?;
    log::info!("relay consumer stopped");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PushQuery {
    token: Option<String>,
}

/// POST {pushPath}. 200 acknowledges; 503 asks Pub/Sub to redeliver.
async fn relay_push(
    State(state): State<ConsumerState>,
    Query(query): Query<PushQuery>,
    body: Bytes,
) -> Response {
    if let Some(ref expected) = state.push_token {
        let provided = query.token.as_deref().unwrap_or("");
        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            log::warn!("rejecting relay push: bad or missing token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    // Unparseable deliveries can never succeed; acknowledge them so they are not redelivered forever.
    let envelope: PushEnvelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("relay push: bad envelope, acknowledging: {}", e);
            return StatusCode::OK.into_response();
        }
    };
    let msg = match RelayMessage::try_from(envelope) {
        Ok(m) => m,
        Err(e) => {
            log::warn!("relay push: bad base64 payload, acknowledging: {}", e);
            return StatusCode::OK.into_response();
        }
    };
    log::debug!("relay push: message {} ({} bytes)", msg.message_id, msg.data.len());

    match handle_delivery(&state.agent, &msg, state.policy).await {
        Delivery::Ack => StatusCode::OK.into_response(),
        Delivery::Redeliver => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn health_http(State(state): State<ConsumerState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "mode": "consumer",
        "port": state.port,
    }))
}
