use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use tracing::warn;

use crate::error::{AuthError, AuthResult};
use crate::extractors::AuthContext;
use crate::roles::ROLE_ADMIN;
use crate::verifier::TokenVerifier;

/// Authorization check for one client-scoped role.
///
/// `check` hard-blocks, `allows` answers a yes/no question; both go through
/// the same claim lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGuard {
    role: String,
}

impl RoleGuard {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// `Forbidden` when the role is absent or the role claims are unreadable.
    pub fn check(&self, auth: &AuthContext) -> AuthResult<()> {
        match auth.claims.lookup_client_role(&auth.client_id, &self.role) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::Forbidden),
            Err(malformed) => {
                warn!(segment = malformed.0, "role claims unreadable; denying access");
                Err(AuthError::Forbidden)
            }
        }
    }

    /// Never fails.
    pub fn allows(&self, auth: &AuthContext) -> bool {
        self.check(auth).is_ok()
    }
}

pub fn require_role(auth: &AuthContext, role: &str) -> AuthResult<()> {
    RoleGuard::new(role).check(auth)
}

pub fn has_role(auth: &AuthContext, role: &str) -> bool {
    RoleGuard::new(role).allows(auth)
}

/// Compile-time role name for [`RequireRole`].
pub trait RequiredRole: Send + Sync + 'static {
    const ROLE: &'static str;
}

/// Extractor that rejects the request with 403 unless the caller holds `R::ROLE`.
#[derive(Debug, Clone)]
pub struct RequireRole<R: RequiredRole> {
    pub auth: AuthContext,
    _role: PhantomData<R>,
}

impl<R: RequiredRole> RequireRole<R> {
    pub fn into_inner(self) -> AuthContext {
        self.auth
    }
}

#[async_trait]
impl<S, R> FromRequestParts<S> for RequireRole<R>
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
    R: RequiredRole,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        RoleGuard::new(R::ROLE).check(&auth)?;
        Ok(Self {
            auth,
            _role: PhantomData,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Admin;

impl RequiredRole for Admin {
    const ROLE: &'static str = ROLE_ADMIN;
}

pub type AdminOnly = RequireRole<Admin>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::TokenClaims;
    use serde_json::{json, Value};

    fn auth_with(claims: Value) -> AuthContext {
        AuthContext {
            claims: TokenClaims::try_from(claims).expect("object"),
            token: "token".into(),
            client_id: "backend".into(),
        }
    }

    #[test]
    fn asserting_and_boolean_guards_agree() {
        let guard = RoleGuard::new("editor");
        let cases = [
            (json!({ "resource_access": { "backend": { "roles": ["editor"] } } }), true),
            (json!({ "resource_access": { "backend": { "roles": ["viewer"] } } }), false),
            (json!({ "resource_access": { "other": { "roles": ["editor"] } } }), false),
            (json!({ "realm_access": { "roles": ["editor"] } }), false),
            (json!({ "resource_access": { "backend": { "roles": "editor" } } }), false),
            (json!({}), false),
        ];

        for (claims, expected) in cases {
            let auth = auth_with(claims);
            assert_eq!(guard.allows(&auth), expected);
            assert_eq!(guard.check(&auth).is_ok(), expected);
            if !expected {
                assert!(matches!(guard.check(&auth), Err(AuthError::Forbidden)));
            }
        }
    }

    #[test]
    fn free_functions_delegate_to_guard() {
        let auth = auth_with(json!({ "resource_access": { "backend": { "roles": ["admin"] } } }));
        assert!(has_role(&auth, "admin"));
        assert!(require_role(&auth, "admin").is_ok());
        assert!(!has_role(&auth, "auditor"));
        assert!(require_role(&auth, "auditor").is_err());
    }

    #[test]
    fn forbidden_does_not_name_the_role() {
        let auth = auth_with(json!({}));
        let err = RoleGuard::new("secret-role").check(&auth).expect_err("denied");
        assert!(!err.to_string().contains("secret-role"));
    }
}
