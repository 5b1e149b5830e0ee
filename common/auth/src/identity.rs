use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::claims::TokenClaims;
use crate::error::{AuthError, AuthResult};
use crate::roles::{ROLE_ADMIN, ROLE_USER};

/// Set of role names; membership is the only question asked of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for RoleSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Caller identity projected from verified claims. Built once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub realm_roles: RoleSet,
    pub client_roles: RoleSet,
}

impl Identity {
    /// Project claims into an identity. Only the subject is required.
    pub fn from_claims(claims: &TokenClaims, client_id: &str) -> AuthResult<Self> {
        let id = claims
            .subject()
            .filter(|sub| !sub.trim().is_empty())
            .ok_or_else(|| AuthError::MalformedClaims("missing subject (sub)".into()))?;

        let owned = |name: &str| claims.str_claim(name).map(str::to_owned);

        Ok(Self {
            id: id.to_owned(),
            username: owned("preferred_username"),
            email: owned("email"),
            first_name: owned("given_name"),
            last_name: owned("family_name"),
            email_verified: claims.bool_claim("email_verified").unwrap_or(false),
            realm_roles: claims.realm_roles().into_iter().collect(),
            client_roles: claims.client_roles(client_id).into_iter().collect(),
        })
    }

    /// Subject as a UUID, for callers that key records by user id.
    pub fn user_id(&self) -> AuthResult<Uuid> {
        Uuid::parse_str(&self.id)
            .map_err(|_| AuthError::MalformedClaims(format!("subject '{}' is not a UUID", self.id)))
    }

    pub fn has_client_role(&self, role: &str) -> bool {
        self.client_roles.contains(role)
    }

    pub fn has_realm_role(&self, role: &str) -> bool {
        self.realm_roles.contains(role)
    }
}

/// Coarse access classification derived from the client-scoped `admin` role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Admin,
    User,
}

impl AccessLevel {
    /// `Admin` when the client roles contain `admin`, `User` otherwise.
    /// Fails with `Forbidden` only when the role structure cannot be read.
    pub fn classify(claims: &TokenClaims, client_id: &str) -> AuthResult<Self> {
        match claims.lookup_client_role(client_id, ROLE_ADMIN) {
            Ok(true) => Ok(AccessLevel::Admin),
            Ok(false) => Ok(AccessLevel::User),
            Err(malformed) => {
                warn!(segment = malformed.0, "cannot classify access level");
                Err(AuthError::Forbidden)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Admin => ROLE_ADMIN,
            AccessLevel::User => ROLE_USER,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
