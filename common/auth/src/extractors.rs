use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap, HeaderValue};

use crate::claims::TokenClaims;
use crate::error::{AuthError, AuthResult};
use crate::guards::RoleGuard;
use crate::identity::{AccessLevel, Identity};
use crate::verifier::TokenVerifier;

/// Verified claims for the current request, scoped to this client.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: TokenClaims,
    pub token: String,
    pub client_id: String,
}

impl AuthContext {
    pub fn identity(&self) -> AuthResult<Identity> {
        Identity::from_claims(&self.claims, &self.client_id)
    }

    /// Client-scoped role membership; `false` whenever the role path is
    /// missing or unreadable.
    pub fn has_role(&self, role: &str) -> bool {
        RoleGuard::new(role).allows(self)
    }

    pub fn access_level(&self) -> AuthResult<AccessLevel> {
        AccessLevel::classify(&self.claims, &self.client_id)
    }

    pub fn into_claims(self) -> TokenClaims {
        self.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<AuthContext>() {
            return Ok(existing.clone());
        }

        let verifier = Arc::<TokenVerifier>::from_ref(state);

        let token = bearer_token(&parts.headers)?;
        let claims = verifier.verify(&token).await?;

        let context = Self {
            claims,
            token,
            client_id: verifier.client_id().to_string(),
        };
        parts.extensions.insert(context.clone());
        Ok(context)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        AuthContext::from_request_parts(parts, state).await?.identity()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AccessLevel
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        AuthContext::from_request_parts(parts, state)
            .await?
            .access_level()
    }
}

/// Bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<String> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthorization)?;
    parse_bearer(value)
}

fn parse_bearer(value: &HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = raw
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthorization)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}
