use std::time::Duration;

use reqwest::Client;

/// Timeout for identity-provider calls unless configured otherwise.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// How the verifier treats an `aud` claim that does not name this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudiencePolicy {
    /// Reject tokens whose audience does not include the client id.
    #[default]
    Enforce,
    /// Accept mismatched audiences; each mismatch is logged.
    Tolerate,
}

/// Runtime configuration for the identity-provider client.
#[derive(Debug, Clone)]
pub struct IdpConfig {
    /// Base URL of the identity provider (e.g. `https://sso.example.com`).
    pub server_url: String,
    /// Realm the client is registered in.
    pub realm: String,
    /// Client identifier; also the expected audience and the key for client roles.
    pub client_id: String,
    /// Client secret, absent for public clients.
    pub client_secret: Option<String>,
    pub audience_policy: AudiencePolicy,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub leeway_seconds: u32,
    /// How long a fetched signing key is served from cache.
    pub key_cache_ttl: Duration,
    /// Minimum key age before a signature mismatch forces a refetch.
    pub key_refetch_cooldown: Duration,
    /// Timeout applied to every call made to the identity provider.
    pub http_timeout: Duration,
    public_key_url: Option<String>,
    token_url: Option<String>,
}

impl IdpConfig {
    /// Construct config with sensible defaults (strict audience, 30 second leeway,
    /// five minute key cache).
    pub fn new(
        server_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: None,
            audience_policy: AudiencePolicy::Enforce,
            leeway_seconds: 30,
            key_cache_ttl: Duration::from_secs(300),
            key_refetch_cooldown: Duration::ZERO,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            public_key_url: None,
            token_url: None,
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_audience_policy(mut self, policy: AudiencePolicy) -> Self {
        self.audience_policy = policy;
        self
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl = ttl;
        self
    }

    pub fn with_key_refetch_cooldown(mut self, cooldown: Duration) -> Self {
        self.key_refetch_cooldown = cooldown;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Override the endpoint serving the realm public key.
    pub fn with_public_key_url(mut self, url: impl Into<String>) -> Self {
        self.public_key_url = Some(url.into());
        self
    }

    /// Override the OpenID Connect token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// HTTP client for identity-provider calls, bounded by `http_timeout`.
    pub fn http_client(&self) -> reqwest::Result<Client> {
        Client::builder().timeout(self.http_timeout).build()
    }

    pub fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.server_url, self.realm)
    }

    /// The realm document, whose `public_key` field carries the signing key.
    pub fn public_key_url(&self) -> String {
        self.public_key_url
            .clone()
            .unwrap_or_else(|| self.realm_url())
    }

    pub fn token_url(&self) -> String {
        self.token_url
            .clone()
            .unwrap_or_else(|| format!("{}/protocol/openid-connect/token", self.realm_url()))
    }
}
