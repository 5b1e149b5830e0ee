use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::{IdpConfig, DEFAULT_HTTP_TIMEOUT};
use crate::error::{AuthError, AuthResult};

pub const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";
pub const PEM_FOOTER: &str = "-----END PUBLIC KEY-----";

/// Realm public key, normalised to PEM and ready for verification.
#[derive(Clone)]
pub struct SigningKey {
    pem: Arc<str>,
    decoding: DecodingKey,
    generation: u64,
    fetched_at: Instant,
}

impl SigningKey {
    /// Parse key material, adding the PEM envelope when the provider omits it.
    pub fn from_pem(raw: &str) -> AuthResult<Self> {
        Self::with_generation(raw, 0)
    }

    fn with_generation(raw: &str, generation: u64) -> AuthResult<Self> {
        let pem = normalize_pem(raw);
        let decoding = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|err| AuthError::KeyFetch(format!("malformed public key: {err}")))?;
        Ok(Self {
            pem: pem.into(),
            decoding,
            generation,
            fetched_at: Instant::now(),
        })
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("generation", &self.generation)
            .field("pem", &self.pem)
            .finish()
    }
}

/// Wrap bare base64 key material in `BEGIN/END PUBLIC KEY` markers.
pub fn normalize_pem(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with(PEM_HEADER) {
        return trimmed.to_string();
    }

    let body: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pem = String::with_capacity(body.len() + PEM_HEADER.len() + PEM_FOOTER.len() + 32);
    pem.push_str(PEM_HEADER);
    pem.push('\n');
    for line in body.as_bytes().chunks(64) {
        // base64 is ASCII, so chunk boundaries are char boundaries
        pem.push_str(std::str::from_utf8(line).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str(PEM_FOOTER);
    pem
}

/// Fetches the realm signing key and caches it for a bounded time.
///
/// Concurrent cache misses are collapsed into a single upstream request: the
/// first caller takes the fetch lock and the rest re-read the cache once it
/// is released.
#[derive(Clone)]
pub struct KeyResolver {
    inner: Arc<Inner>,
    refetch_cooldown: Duration,
}

struct Inner {
    client: Client,
    url: String,
    ttl: Duration,
    cache: RwLock<Option<SigningKey>>,
    fetch_lock: Mutex<()>,
    generation: AtomicU64,
}

impl KeyResolver {
    /// Resolver with its own HTTP client, bounded by the default timeout.
    pub fn new(url: impl Into<String>, ttl: Duration) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|err| AuthError::KeyFetch(format!("cannot build HTTP client: {err}")))?;
        Ok(Self::with_client(client, url, ttl))
    }

    pub fn with_client(client: Client, url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                url: url.into(),
                ttl,
                cache: RwLock::new(None),
                fetch_lock: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
            refetch_cooldown: Duration::ZERO,
        }
    }

    pub fn from_config(config: &IdpConfig, client: Client) -> Self {
        Self::with_client(client, config.public_key_url(), config.key_cache_ttl)
            .with_refetch_cooldown(config.key_refetch_cooldown)
    }

    /// Minimum age a cached key must reach before a signature mismatch may
    /// refetch it. Zero refetches on every mismatch.
    pub fn with_refetch_cooldown(mut self, cooldown: Duration) -> Self {
        self.refetch_cooldown = cooldown;
        self
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Current signing key, served from cache while it is fresh.
    pub async fn get_signing_key(&self) -> AuthResult<SigningKey> {
        if let Some(key) = self.cached().await {
            return Ok(key);
        }

        let _guard = self.inner.fetch_lock.lock().await;
        if let Some(key) = self.cached().await {
            return Ok(key);
        }
        self.fetch_and_store().await
    }

    /// Force a refetch after `stale` failed to verify a signature.
    ///
    /// When another task already replaced `stale` while this one waited for
    /// the fetch lock, the replacement is returned without a second fetch.
    /// A key younger than the refetch cooldown is returned as is.
    pub async fn refresh_after_mismatch(&self, stale: &SigningKey) -> AuthResult<SigningKey> {
        let _guard = self.inner.fetch_lock.lock().await;
        if let Some(current) = self.inner.cache.read().await.as_ref() {
            if current.generation != stale.generation && current.is_fresh(self.inner.ttl) {
                return Ok(current.clone());
            }
            if current.fetched_at.elapsed() < self.refetch_cooldown {
                debug!(url = %self.inner.url, "signature mismatch within refetch cooldown");
                return Ok(current.clone());
            }
        }
        warn!(url = %self.inner.url, "signature mismatch; refetching realm public key");
        self.fetch_and_store().await
    }

    /// Drop the cached key so the next lookup goes upstream.
    pub async fn invalidate(&self) {
        self.inner.cache.write().await.take();
    }

    pub async fn is_cached(&self) -> bool {
        self.cached().await.is_some()
    }

    async fn cached(&self) -> Option<SigningKey> {
        let cache = self.inner.cache.read().await;
        cache
            .as_ref()
            .filter(|key| key.is_fresh(self.inner.ttl))
            .cloned()
    }

    async fn fetch_and_store(&self) -> AuthResult<SigningKey> {
        let raw = self.fetch().await?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let key = SigningKey::with_generation(&raw, generation)?;
        *self.inner.cache.write().await = Some(key.clone());
        debug!(url = %self.inner.url, generation, "fetched realm public key");
        Ok(key)
    }

    async fn fetch(&self) -> AuthResult<String> {
        let response = self
            .inner
            .client
            .get(&self.inner.url)
            .send()
            .await
            .map_err(|err| AuthError::KeyFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.inner.url
            )));
        }

        let body: RealmKeyResponse = response
            .json()
            .await
            .map_err(|err| AuthError::KeyFetch(err.to_string()))?;

        match body.public_key {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(AuthError::KeyFetch(format!(
                "realm document at {} has no public_key",
                self.inner.url
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RealmKeyResponse {
    #[serde(default)]
    public_key: Option<String>,
}
