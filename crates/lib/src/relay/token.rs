//! Access tokens for Pub/Sub publish calls.

use crate::relay::publisher::EnqueueError;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Tokens are refreshed this long before the metadata server says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Where publish calls get their bearer token.
#[derive(Clone)]
pub enum TokenSource {
    /// No `Authorization` header (Pub/Sub emulator).
    None,
    /// A fixed token. Never refreshed; publishing fails once it expires.
    Static(String),
    /// Fetched from the metadata server and cached until shortly before expiry.
    Metadata(MetadataToken),
}

impl TokenSource {
    /// Current bearer token, fetching or refreshing it when needed.
    pub async fn token(&self) -> Result<Option<String>, EnqueueError> {
        match self {
            TokenSource::None => Ok(None),
            TokenSource::Static(t) => Ok(Some(t.clone())),
            TokenSource::Metadata(m) => m.token().await.map(Some),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, TokenSource::None)
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Service-account token from the GCE/Cloud Run metadata server.
#[derive(Clone)]
pub struct MetadataToken {
    url: String,
    client: reqwest::Client,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl MetadataToken {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Cached token, or a fresh one when the cache is empty or close to expiry.
    /// The lock is held across the fetch so concurrent publishers share one refresh.
    pub async fn token(&self) -> Result<String, EnqueueError> {
        let mut cached = self.cached.lock().await;
        if let Some(ref c) = *cached {
            if Instant::now() < c.refresh_at {
                return Ok(c.value.clone());
            }
            log::debug!("pubsub access token near expiry, refreshing");
        }
        let res = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(EnqueueError::Token { status, body });
        }
        let data: MetadataTokenResponse = res.json().await?;
        let lifetime = Duration::from_secs(data.expires_in).saturating_sub(REFRESH_MARGIN);
        log::info!(
            "fetched pubsub access token from metadata server (expires in {}s)",
            data.expires_in
        );
        *cached = Some(CachedToken {
            value: data.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(data.access_token)
    }
}
