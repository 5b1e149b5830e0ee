use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{IdpConfig, DEFAULT_HTTP_TIMEOUT};
use crate::error::{AuthError, AuthResult};

pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

/// Token set returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Lifetime of the access token in seconds, as reported by the provider.
    pub expires_in: Option<i64>,
    pub refresh_expires_in: Option<i64>,
    pub access_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl From<TokenResponse> for TokenPair {
    fn from(value: TokenResponse) -> Self {
        let access_expires_at = value
            .expires_in
            .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds));
        Self {
            access_token: value.access_token,
            refresh_token: value.refresh_token,
            token_type: value.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: value.expires_in,
            refresh_expires_in: value.refresh_expires_in,
            access_expires_at,
        }
    }
}

/// Client for the identity provider's OpenID Connect token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl TokenClient {
    /// Client with its own HTTP client, bounded by the default timeout.
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|err| AuthError::TokenEndpoint {
                status: None,
                reason: format!("cannot build HTTP client: {err}"),
            })?;
        Ok(Self::with_client(client, token_url, client_id, client_secret))
    }

    pub fn with_client(
        client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    pub fn from_config(config: &IdpConfig, client: Client) -> Self {
        Self::with_client(
            client,
            config.token_url(),
            config.client_id.clone(),
            config.client_secret.clone(),
        )
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// Providers that do not rotate refresh tokens omit one from the response;
    /// the presented token is carried forward in that case.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let mut pair = self
            .request(GRANT_REFRESH_TOKEN, &[("refresh_token", refresh_token)])
            .await?;
        if pair.refresh_token.is_none() {
            pair.refresh_token = Some(refresh_token.to_string());
        }
        Ok(pair)
    }

    /// Service-account token issued to this client with its own credentials.
    pub async fn client_credentials(&self) -> AuthResult<TokenPair> {
        self.request(GRANT_CLIENT_CREDENTIALS, &[]).await
    }

    async fn request(&self, grant_type: &str, extra: &[(&str, &str)]) -> AuthResult<TokenPair> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", grant_type),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        form.extend_from_slice(extra);

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|err| AuthError::TokenEndpoint {
                status: None,
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = match response.json::<OAuthErrorResponse>().await {
                Ok(body) => match body.error_description {
                    Some(description) => format!("{}: {description}", body.error),
                    None => body.error,
                },
                Err(_) => format!("HTTP {status}"),
            };
            warn!(grant_type, status = status.as_u16(), %reason, "token endpoint rejected grant");
            return Err(AuthError::TokenEndpoint {
                status: Some(status.as_u16()),
                reason,
            });
        }

        let body: TokenResponse = response.json().await.map_err(|err| AuthError::TokenEndpoint {
            status: Some(status.as_u16()),
            reason: format!("malformed token response: {err}"),
        })?;
        debug!(grant_type, "token endpoint issued tokens");
        Ok(body.into())
    }
}
