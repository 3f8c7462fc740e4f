//! Webhook HTTP server: Slack Events API endpoint, health, and the optional completion endpoint.

use crate::agent::Agent;
use crate::channels::{check_challenge, decode_event, SignatureVerifier, SlackChannel};
use crate::config::{self, Config, DispatchMode};
use crate::gateway::dispatch::{DirectDispatch, Dispatched, Dispatcher, InFlight, QueueDispatch};
use crate::llm::OpenAiClient;
use crate::relay::{MetadataToken, PubSubPublisher, TokenSource};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

/// Shared state for the webhook server (verifier, dispatch strategy, optional completion endpoint).
#[derive(Clone)]
pub struct WebhookState {
    /// None only when unsigned webhooks were explicitly allowed.
    pub verifier: Option<Arc<SignatureVerifier>>,
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Set when `POST /complete` is served.
    pub completer: Option<Agent>,
    /// When Some, `/complete` requires `Authorization: Bearer <token>`.
    pub required_token: Option<String>,
    pub port: u16,
}

/// Router for the webhook process. `/complete` is mounted only when `state.completer` is set.
pub fn router(state: WebhookState, webhook_path: &str) -> Router {
    let mut app = Router::new()
        .route("/", get(health_http))
        .route(webhook_path, post(slack_events));
    if state.completer.is_some() {
        app = app.route("/complete", post(complete_http));
    }
    app.with_state(state)
}

/// Completion client + Slack publisher from config. Fails fast on missing credentials.
pub fn build_agent(config: &Config, require_bot_token: bool) -> Result<Agent> {
    let api_key = config::resolve_api_key(config).context(
        "completion API key not configured (set completion.apiKey or OPENAI_API_KEY)",
    )?;
    let bot_token = config::resolve_bot_token(config);
    if require_bot_token && bot_token.is_none() {
        anyhow::bail!("slack bot token not configured (set slack.botToken or SLACK_BOT_TOKEN)");
    }
    let completion = OpenAiClient::new(
        Some(api_key),
        Some(config::resolve_completion_base_url(config)),
        config::resolve_default_model(config),
        Duration::from_secs(config.completion.timeout_secs.max(1)),
    );
    log::info!("completion default model: {}", completion.default_model());
    let slack = SlackChannel::new(
        bot_token,
        Some(config.slack.api_base.clone()),
        Duration::from_secs(config.slack.timeout_secs.max(1)),
    );
    Ok(Agent::new(
        Arc::new(completion),
        Arc::new(slack),
        config.gateway.turn_timeout(),
    ))
}

/// Signing secret → verifier. Without a secret startup fails unless unsigned webhooks were explicitly allowed.
pub(crate) fn build_verifier(config: &Config) -> Result<Option<Arc<SignatureVerifier>>> {
    match config::resolve_signing_secret(config) {
        Some(secret) => Ok(Some(Arc::new(SignatureVerifier::new(secret)))),
        None if config::allow_unsigned_webhooks(config) => {
            log::warn!(
                "SLACK SIGNATURE VERIFICATION DISABLED: no signing secret and unsigned webhooks allowed; anyone can trigger completions"
            );
            Ok(None)
        }
        None => anyhow::bail!(
            "slack signing secret not configured (set slack.signingSecret or SLACK_SIGNING_SECRET; \
             slack.allowUnsignedWebhooks disables verification)"
        ),
    }
}

/// Pub/Sub publisher from config. Publishing to the Google endpoint needs a static token or
/// the metadata server; any other base (the emulator) may run without credentials.
pub(crate) fn build_publisher(config: &Config) -> Result<PubSubPublisher> {
    let project = config::resolve_project_id(config).context(
        "queue mode needs a Pub/Sub project (set relay.projectId or CLOUD_PROJECT_ID)",
    )?;
    let topic = config::resolve_topic(config).context(
        "queue mode needs a Pub/Sub topic (set relay.topic or CLOUD_PUB_SUB_TOPIC)",
    )?;
    let timeout = Duration::from_secs(config.relay.timeout_secs.max(1));
    let token = match config::resolve_access_token(config) {
        Some(t) => TokenSource::Static(t),
        None if config.relay.use_metadata_server => TokenSource::Metadata(MetadataToken::new(
            config.relay.metadata_token_url.clone(),
            timeout,
        )),
        None => TokenSource::None,
    };
    let api_base = config.relay.api_base.trim().trim_end_matches('/');
    if token.is_none() && api_base == config::GOOGLE_PUBSUB_API_BASE {
        anyhow::bail!(
            "queue mode publishing to {} needs credentials (set relay.accessToken, \
             PUBSUB_ACCESS_TOKEN, or relay.useMetadataServer)",
            api_base
        );
    }
    if let TokenSource::Static(_) = token {
        log::info!("relay: using a static access token; it is not refreshed when it expires");
    }
    Ok(PubSubPublisher::new(
        project,
        topic,
        Some(api_base.to_string()),
        token,
        timeout,
    ))
}

/// Run the webhook server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback and `/complete` is enabled, a gateway token must be configured or startup fails.
/// Blocks until shutdown (e.g. Ctrl+C), then drains in-flight turns.
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let required_token = config::resolve_gateway_token(&config);
    if config.gateway.completion_endpoint
        && !config::is_loopback_bind(&bind)
        && required_token.is_none()
    {
        anyhow::bail!(
            "refusing to serve /complete on {} without auth (set gateway.token or BRIDGE_GATEWAY_TOKEN)",
            bind
        );
    }

    let verifier = build_verifier(&config)?;
    let in_flight = InFlight::default();
    let mode = config.relay.mode;
    let dispatcher: Arc<dyn Dispatcher> = match mode {
        DispatchMode::Direct => {
            let agent = build_agent(&config, true)?;
            Arc::new(DirectDispatch::new(agent, in_flight.clone()))
        }
        DispatchMode::Queue => {
            let publisher = build_publisher(&config)?;
            log::info!("relay: publishing to {}", publisher.topic_path());
            Arc::new(QueueDispatch::new(Arc::new(publisher)))
        }
    };
    let completer = if config.gateway.completion_endpoint {
        Some(build_agent(&config, false)?)
    } else {
        None
    };

    let state = WebhookState {
        verifier,
        dispatcher,
        completer,
        required_token,
        port: config.gateway.port,
    };
    let app = router(state, &config.gateway.webhook_path);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "gateway listening on {} ({} mode, webhook path {})",
        bind_addr,
        mode.as_str(),
        config.gateway.webhook_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    in_flight.drain(config.gateway.shutdown_grace()).await;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST {webhookPath}: verify, answer the handshake, decode, filter, dispatch.
async fn slack_events(
    State(state): State<WebhookState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.verifier {
        Some(ref verifier) => {
            if !verifier.verify(&headers, &body) {
                log::warn!("rejecting webhook: invalid or stale signature");
                return StatusCode::UNAUTHORIZED.into_response();
            }
        }
        None => log::warn!("accepting unsigned webhook (signature verification disabled)"),
    }

    if let Some(res) = check_challenge(&method, &body).respond() {
        log::info!("answered url_verification handshake");
        return res;
    }

    let event = match decode_event(&body) {
        Ok(Some(e)) => e,
        Ok(None) => {
            log::debug!("empty webhook body, nothing to do");
            return StatusCode::OK.into_response();
        }
        Err(e) => {
            log::warn!("webhook body rejected: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(reason) = event.accept() {
        log::debug!("ignoring event {}: {}", event.event_id, reason);
        return StatusCode::OK.into_response();
    }

    let event_id = event.event_id.clone();
    match state.dispatcher.dispatch(event).await {
        Ok(Dispatched::Spawned) => {
            log::debug!("event {}: turn started", event_id);
            StatusCode::OK.into_response()
        }
        Ok(Dispatched::Queued(_)) => StatusCode::OK.into_response(),
        Err(e) => {
            log::warn!("event {}: enqueue failed: {}", event_id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompleteBody {
    message: String,
    #[serde(default)]
    model: Option<String>,
}

/// POST /complete: `{"message": "..."}` in, HTML-escaped completion text out.
async fn complete_http(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(ref agent) = state.completer else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(ref expected) = state.required_token {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");
        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    let req: CompleteBody = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            log::debug!("/complete: bad request body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    log::info!("/complete: {} byte prompt", req.message.len());
    match agent.complete_only(&req.message, req.model).await {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            html_escape::encode_safe(&text).into_owned(),
        )
            .into_response(),
        Err(e) => {
            log::warn!("/complete: completion failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET / returns a simple health JSON (for liveness checks).
async fn health_http(State(state): State<WebhookState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "mode": state.dispatcher.mode().as_str(),
        "port": state.port,
    }))
}
