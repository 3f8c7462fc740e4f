//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.bridge/config.json`) and environment.
//! Secrets and deployment-specific names are usually supplied through the environment;
//! [`Config::apply_env`] folds non-blank environment values over the file at load time,
//! so the `resolve_*` helpers read only the config they are given.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Model used when neither the request, the config file, nor OPENAI_MODEL names one.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Slack signing secret, bot token, and API endpoint.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Completion provider settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Dispatch mode and Pub/Sub relay settings.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Gateway bind, port, and endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook server (default 3000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Path Slack delivers Events API requests to.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,

    /// Bearer token for the `/complete` endpoint. Overridden by BRIDGE_GATEWAY_TOKEN env.
    pub token: Option<String>,

    /// Serve `POST /complete` (plain `{"message": ...}` in, escaped completion text out).
    #[serde(default)]
    pub completion_endpoint: bool,

    /// Upper bound for one detached completion + reply turn.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,

    /// How long shutdown waits for in-flight turns before giving up on them.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_path() -> String {
    "/slack/events".to_string()
}

fn default_turn_timeout_secs() -> u64 {
    60
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            webhook_path: default_webhook_path(),
            token: None,
            completion_endpoint: false,
            turn_timeout_secs: default_turn_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Slack app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Signing secret from the app's Basic Information page. Overridden by SLACK_SIGNING_SECRET env.
    pub signing_secret: Option<String>,

    /// Bot User OAuth token (xoxb-...). Overridden by SLACK_BOT_TOKEN env.
    pub bot_token: Option<String>,

    /// Web API base URL (default https://slack.com/api).
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,

    /// Timeout for chat.postMessage calls.
    #[serde(default = "default_slack_timeout_secs")]
    pub timeout_secs: u64,

    /// Accept webhooks without signature verification when no signing secret is set.
    /// Insecure; logged at startup and on every request. Also enabled by BRIDGE_ALLOW_UNSIGNED_WEBHOOKS=true.
    #[serde(default)]
    pub allow_unsigned_webhooks: bool,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_slack_timeout_secs() -> u64 {
    10
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            bot_token: None,
            api_base: default_slack_api_base(),
            timeout_secs: default_slack_timeout_secs(),
            allow_unsigned_webhooks: false,
        }
    }
}

/// Completion provider settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    /// API key. Overridden by OPENAI_API_KEY env.
    pub api_key: Option<String>,

    /// API base including the version segment. Overridden by OPENAI_BASE_URL env.
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,

    /// Model used when a request names none. Overridden by OPENAI_MODEL env.
    pub default_model: Option<String>,

    /// Timeout for one completion request.
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_completion_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_timeout_secs() -> u64 {
    45
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_completion_base_url(),
            default_model: None,
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

/// How an accepted webhook message is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Complete and reply in a detached task of the webhook process.
    #[default]
    Direct,

    /// Publish the event to Pub/Sub; a consumer process completes and replies.
    Queue,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Direct => "direct",
            DispatchMode::Queue => "queue",
        }
    }
}

/// Pub/Sub relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    #[serde(default)]
    pub mode: DispatchMode,

    /// Google Cloud project. Overridden by CLOUD_PROJECT_ID env.
    pub project_id: Option<String>,

    /// Topic events are published to. Overridden by CLOUD_PUB_SUB_TOPIC env.
    pub topic: Option<String>,

    /// Pub/Sub REST base (default https://pubsub.googleapis.com; point at the emulator for local runs).
    #[serde(default = "default_pubsub_api_base")]
    pub api_base: String,

    /// Static OAuth access token for publish calls. Overridden by PUBSUB_ACCESS_TOKEN env.
    /// Google access tokens expire (typically after an hour) and a static token is never
    /// refreshed; long-running deployments should set `useMetadataServer` instead.
    /// Optional for the emulator (any non-default `apiBase`).
    pub access_token: Option<String>,

    /// Fetch and refresh access tokens from the GCE/Cloud Run metadata server.
    /// Ignored when a static access token is set.
    #[serde(default)]
    pub use_metadata_server: bool,

    /// Metadata server token endpoint.
    #[serde(default = "default_metadata_token_url")]
    pub metadata_token_url: String,

    /// Timeout for one publish call.
    #[serde(default = "default_publish_timeout_secs")]
    pub timeout_secs: u64,

    /// Path the push subscription delivers to on the consumer server.
    #[serde(default = "default_push_path")]
    pub push_path: String,

    /// When set, push deliveries must carry `?token=<value>`.
    pub push_token: Option<String>,

    /// Port for the consumer server (default 3001).
    #[serde(default = "default_consumer_port")]
    pub consumer_port: u16,

    /// Answer 503 on transient completion failures so Pub/Sub redelivers. Default: always acknowledge.
    #[serde(default)]
    pub redeliver_transient_failures: bool,
}

fn default_pubsub_api_base() -> String {
    GOOGLE_PUBSUB_API_BASE.to_string()
}

/// Default Pub/Sub REST base; publishing here needs credentials.
pub const GOOGLE_PUBSUB_API_BASE: &str = "https://pubsub.googleapis.com";

fn default_metadata_token_url() -> String {
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
        .to_string()
}

fn default_publish_timeout_secs() -> u64 {
    5
}

fn default_push_path() -> String {
    "/relay/push".to_string()
}

fn default_consumer_port() -> u16 {
    3001
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            project_id: None,
            topic: None,
            api_base: default_pubsub_api_base(),
            access_token: None,
            use_metadata_server: false,
            metadata_token_url: default_metadata_token_url(),
            timeout_secs: default_publish_timeout_secs(),
            push_path: default_push_path(),
            push_token: None,
            consumer_port: default_consumer_port(),
            redeliver_transient_failures: false,
        }
    }
}

/// Non-blank, trimmed value.
fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Non-blank, trimmed config value.
fn config_value(value: Option<&String>) -> Option<String> {
    non_blank(value.cloned())
}

impl Config {
    /// Fold environment overrides into the config. `lookup` returns a variable's value;
    /// blank values are ignored. [`load_config`] calls this with the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| non_blank(lookup(name));
        if let Some(v) = get("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = Some(v);
        }
        if let Some(v) = get("SLACK_BOT_TOKEN") {
            self.slack.bot_token = Some(v);
        }
        if let Some(v) = get("BRIDGE_ALLOW_UNSIGNED_WEBHOOKS") {
            self.slack.allow_unsigned_webhooks =
                matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.completion.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.completion.base_url = v;
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.completion.default_model = Some(v);
        }
        if let Some(v) = get("CLOUD_PUB_SUB_TOPIC") {
            self.relay.topic = Some(v);
        }
        if let Some(v) = get("CLOUD_PROJECT_ID") {
            self.relay.project_id = Some(v);
        }
        if let Some(v) = get("PUBSUB_ACCESS_TOKEN") {
            self.relay.access_token = Some(v);
        }
        if let Some(v) = get("BRIDGE_GATEWAY_TOKEN") {
            self.gateway.token = Some(v);
        }
    }
}

pub fn resolve_signing_secret(config: &Config) -> Option<String> {
    config_value(config.slack.signing_secret.as_ref())
}

pub fn resolve_bot_token(config: &Config) -> Option<String> {
    config_value(config.slack.bot_token.as_ref())
}

pub fn resolve_api_key(config: &Config) -> Option<String> {
    config_value(config.completion.api_key.as_ref())
}

pub fn resolve_completion_base_url(config: &Config) -> String {
    config_value(Some(&config.completion.base_url)).unwrap_or_else(default_completion_base_url)
}

/// Configured default model, else [`DEFAULT_MODEL`].
pub fn resolve_default_model(config: &Config) -> String {
    config_value(config.completion.default_model.as_ref())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

pub fn resolve_topic(config: &Config) -> Option<String> {
    config_value(config.relay.topic.as_ref())
}

pub fn resolve_project_id(config: &Config) -> Option<String> {
    config_value(config.relay.project_id.as_ref())
}

pub fn resolve_access_token(config: &Config) -> Option<String> {
    config_value(config.relay.access_token.as_ref())
}

pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    config_value(config.gateway.token.as_ref())
}

pub fn allow_unsigned_webhooks(config: &Config) -> bool {
    config.slack.allow_unsigned_webhooks
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("BRIDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".bridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or BRIDGE_CONFIG_PATH / the default), then apply
/// environment overrides. Missing file => default config.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config: Config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    config.apply_env(|name| std::env::var(name).ok());
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 3000);
        assert_eq!(g.bind, "127.0.0.1");
        assert_eq!(g.webhook_path, "/slack/events");
    }

    #[test]
    fn empty_json_is_default_config() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.relay.mode, DispatchMode::Direct);
        assert_eq!(config.relay.push_path, "/relay/push");
        assert_eq!(config.slack.api_base, "https://slack.com/api");
        assert!(!config.slack.allow_unsigned_webhooks);
    }

    #[test]
    fn camel_case_keys_and_queue_mode() {
        let config: Config = serde_json::from_str(
            r#"{
                "slack": { "signingSecret": "s3cret", "allowUnsignedWebhooks": true },
                "relay": { "mode": "queue", "projectId": "p", "topic": "t", "redeliverTransientFailures": true }
            }"#,
        )
        .unwrap();
        assert_eq!(config.slack.signing_secret.as_deref(), Some("s3cret"));
        assert!(config.slack.allow_unsigned_webhooks);
        assert_eq!(config.relay.mode, DispatchMode::Queue);
        assert_eq!(config.relay.project_id.as_deref(), Some("p"));
        assert!(config.relay.redeliver_transient_failures);
    }

    #[test]
    fn blank_config_values_are_ignored() {
        assert_eq!(config_value(Some(&"   ".to_string())), None);
        assert_eq!(config_value(Some(&" x ".to_string())), Some("x".to_string()));
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = serde_json::from_str(
            r#"{
                "slack": { "signingSecret": "from-file", "botToken": "xoxb-file" },
                "completion": { "defaultModel": "gpt-3.5-turbo" },
                "relay": { "topic": "file-topic" }
            }"#,
        )
        .unwrap();
        config.apply_env(env(&[
            ("SLACK_SIGNING_SECRET", "from-env"),
            ("OPENAI_API_KEY", " sk-env "),
            ("OPENAI_MODEL", "gpt-4o"),
            ("CLOUD_PUB_SUB_TOPIC", "env-topic"),
            ("CLOUD_PROJECT_ID", "env-project"),
            ("PUBSUB_ACCESS_TOKEN", "ya29.env"),
            ("BRIDGE_GATEWAY_TOKEN", "gw"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
        ]));
        assert_eq!(resolve_signing_secret(&config).as_deref(), Some("from-env"));
        assert_eq!(resolve_bot_token(&config).as_deref(), Some("xoxb-file"));
        assert_eq!(resolve_api_key(&config).as_deref(), Some("sk-env"));
        assert_eq!(resolve_default_model(&config), "gpt-4o");
        assert_eq!(resolve_topic(&config).as_deref(), Some("env-topic"));
        assert_eq!(resolve_project_id(&config).as_deref(), Some("env-project"));
        assert_eq!(resolve_access_token(&config).as_deref(), Some("ya29.env"));
        assert_eq!(resolve_gateway_token(&config).as_deref(), Some("gw"));
        assert_eq!(resolve_completion_base_url(&config), "http://localhost:8080/v1");
    }

    #[test]
    fn blank_env_values_keep_file_values() {
        let mut config = Config::default();
        config.slack.signing_secret = Some("from-file".to_string());
        config.apply_env(env(&[("SLACK_SIGNING_SECRET", "  "), ("OPENAI_MODEL", "")]));
        assert_eq!(resolve_signing_secret(&config).as_deref(), Some("from-file"));
        assert_eq!(resolve_default_model(&config), DEFAULT_MODEL);
    }

    #[test]
    fn unsigned_webhooks_env_flag() {
        let mut config = Config::default();
        config.apply_env(env(&[("BRIDGE_ALLOW_UNSIGNED_WEBHOOKS", "TRUE")]));
        assert!(allow_unsigned_webhooks(&config));
        config.apply_env(env(&[("BRIDGE_ALLOW_UNSIGNED_WEBHOOKS", "no")]));
        assert!(!allow_unsigned_webhooks(&config));
    }

    #[test]
    fn metadata_server_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "relay": { "useMetadataServer": true } }"#).unwrap();
        assert!(config.relay.use_metadata_server);
        assert!(config
            .relay
            .metadata_token_url
            .starts_with("http://metadata.google.internal/"));
        assert_eq!(config.relay.api_base, GOOGLE_PUBSUB_API_BASE);
    }

    #[test]
    fn turn_timeout_is_never_zero() {
        let g = GatewayConfig {
            turn_timeout_secs: 0,
            ..GatewayConfig::default()
        };
        assert_eq!(g.turn_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn loopback_binds() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(!is_loopback_bind("0.0.0.0"));
    }
}
