pub mod claims;
pub mod client;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod identity;
pub mod keys;
pub mod refresh;
pub mod roles;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use claims::TokenClaims;
pub use client::{TokenClient, TokenPair};
pub use config::{AudiencePolicy, IdpConfig};
pub use error::{AuthError, AuthResult};
pub use extractors::{bearer_token, AuthContext};
pub use guards::{has_role, require_role, AdminOnly, RequireRole, RequiredRole, RoleGuard};
pub use identity::{AccessLevel, Identity, RoleSet};
pub use keys::{KeyResolver, SigningKey};
pub use refresh::{refresh_middleware, RefreshConfig, RefreshInterceptor};
pub use roles::{ROLE_ADMIN, ROLE_USER};
pub use verifier::TokenVerifier;
