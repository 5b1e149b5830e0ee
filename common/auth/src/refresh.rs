//! Transparent access-token refresh at the request boundary.
//!
//! Refresh tokens are read from the `X-Refresh-Token` header, falling back to
//! the `refresh_token` cookie. After a successful refresh the new pair is
//! returned in `X-Access-Token`, `X-Refresh-Token` and
//! `X-Access-Token-Expires-In` response headers. All names are configurable
//! through [`RefreshConfig`].

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use headers::{Cookie, HeaderMapExt};
use tracing::{debug, info, warn};

use crate::client::{TokenClient, TokenPair};
use crate::error::{AuthError, AuthResult};
use crate::extractors::{bearer_token, AuthContext};
use crate::verifier::TokenVerifier;

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Request header carrying the refresh token.
    pub refresh_header: HeaderName,
    /// Cookie consulted when the refresh header is absent.
    pub refresh_cookie: String,
    pub access_token_response_header: HeaderName,
    pub refresh_token_response_header: HeaderName,
    pub expires_in_response_header: HeaderName,
    /// Also refresh when verification fails for reasons other than expiry.
    pub refresh_on_invalid: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_header: HeaderName::from_static("x-refresh-token"),
            refresh_cookie: "refresh_token".to_string(),
            access_token_response_header: HeaderName::from_static("x-access-token"),
            refresh_token_response_header: HeaderName::from_static("x-refresh-token"),
            expires_in_response_header: HeaderName::from_static("x-access-token-expires-in"),
            refresh_on_invalid: false,
        }
    }
}

impl RefreshConfig {
    pub fn with_refresh_header(mut self, name: HeaderName) -> Self {
        self.refresh_header = name;
        self
    }

    pub fn with_refresh_cookie(mut self, name: impl Into<String>) -> Self {
        self.refresh_cookie = name.into();
        self
    }

    pub fn with_refresh_on_invalid(mut self, enabled: bool) -> Self {
        self.refresh_on_invalid = enabled;
        self
    }
}

/// Request pipeline stage that swaps an expired access token for a fresh one.
///
/// Per request: a valid token passes straight through; an expired token with
/// a refresh token is exchanged once, the request is re-dispatched with the
/// new bearer token and the new pair is attached to the response; anything
/// else short-circuits with [`AuthError::Authentication`].
#[derive(Clone)]
pub struct RefreshInterceptor {
    verifier: Arc<TokenVerifier>,
    tokens: TokenClient,
    config: RefreshConfig,
}

impl RefreshInterceptor {
    pub fn new(verifier: Arc<TokenVerifier>, tokens: TokenClient, config: RefreshConfig) -> Self {
        Self {
            verifier,
            tokens,
            config,
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Run the stage. `next` is the downstream handler and is called at most once.
    pub async fn intercept<B, F, Fut>(
        &self,
        mut request: axum::http::Request<B>,
        next: F,
    ) -> AuthResult<Response>
    where
        F: FnOnce(axum::http::Request<B>) -> Fut,
        Fut: Future<Output = Response>,
    {
        let access = bearer_token(request.headers())
            .map_err(|err| AuthError::Authentication(err.to_string()))?;
        let refresh_token = self.refresh_token(request.headers());

        let failure = match self.verifier.verify(&access).await {
            Ok(claims) => {
                request.extensions_mut().insert(AuthContext {
                    claims,
                    token: access,
                    client_id: self.verifier.client_id().to_string(),
                });
                return Ok(next(request).await);
            }
            Err(err) => err,
        };

        let eligible = match &failure {
            AuthError::ExpiredToken => true,
            AuthError::InvalidToken(_) => self.config.refresh_on_invalid,
            _ => false,
        };
        let refresh_token = match refresh_token {
            Some(token) if eligible => token,
            _ => {
                debug!(error = %failure, "access token rejected; no refresh attempted");
                return Err(AuthError::Authentication(failure.to_string()));
            }
        };

        let pair = self.tokens.refresh(&refresh_token).await.map_err(|err| {
            warn!(error = %err, "refresh token exchange failed");
            AuthError::Authentication(format!("token refresh failed: {err}"))
        })?;
        let headers = RefreshedHeaders::new(&pair)?;

        let request_headers = request.headers_mut();
        request_headers.insert(AUTHORIZATION, headers.authorization.clone());
        if let Some(refresh) = &headers.refresh_token {
            request_headers.insert(self.config.refresh_header.clone(), refresh.clone());
        }

        info!("refreshed expired access token");
        let mut response = next(request).await;
        headers.attach(&self.config, response.headers_mut());
        Ok(response)
    }

    fn refresh_token(&self, headers: &HeaderMap) -> Option<String> {
        let from_header = headers
            .get(&self.config.refresh_header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned);

        from_header.or_else(|| {
            headers
                .typed_get::<Cookie>()
                .and_then(|cookie| cookie.get(&self.config.refresh_cookie).map(str::to_owned))
                .filter(|value| !value.is_empty())
        })
    }
}

/// Header values for a refreshed pair, validated before the handler runs so
/// that attaching them afterwards cannot fail.
struct RefreshedHeaders {
    authorization: HeaderValue,
    access_token: HeaderValue,
    refresh_token: Option<HeaderValue>,
    expires_in: Option<HeaderValue>,
}

impl RefreshedHeaders {
    fn new(pair: &TokenPair) -> AuthResult<Self> {
        let unusable =
            |_| AuthError::Authentication("identity provider issued an unusable token".into());

        Ok(Self {
            authorization: HeaderValue::from_str(&format!("Bearer {}", pair.access_token))
                .map_err(unusable)?,
            access_token: HeaderValue::from_str(&pair.access_token).map_err(unusable)?,
            refresh_token: pair
                .refresh_token
                .as_deref()
                .map(HeaderValue::from_str)
                .transpose()
                .map_err(unusable)?,
            expires_in: pair.expires_in.map(HeaderValue::from),
        })
    }

    fn attach(self, config: &RefreshConfig, headers: &mut HeaderMap) {
        headers.insert(config.access_token_response_header.clone(), self.access_token);
        if let Some(refresh) = self.refresh_token {
            headers.insert(config.refresh_token_response_header.clone(), refresh);
        }
        if let Some(expires_in) = self.expires_in {
            headers.insert(config.expires_in_response_header.clone(), expires_in);
        }
    }
}

/// Axum adapter: `axum::middleware::from_fn_with_state(interceptor, refresh_middleware)`.
pub async fn refresh_middleware(
    State(interceptor): State<Arc<RefreshInterceptor>>,
    request: Request,
    next: Next,
) -> Response {
    match interceptor
        .intercept(request, move |request| next.run(request))
        .await
    {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}
