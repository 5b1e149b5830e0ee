use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::Value;
use tracing::{debug, warn};

use crate::claims::TokenClaims;
use crate::config::{AudiencePolicy, IdpConfig};
use crate::error::{AuthError, AuthResult};
use crate::keys::{KeyResolver, SigningKey};

/// The only accepted signing algorithm.
pub const ACCEPTED_ALGORITHM: Algorithm = Algorithm::RS256;

/// Validates bearer tokens against the realm signing key.
#[derive(Clone)]
pub struct TokenVerifier {
    config: IdpConfig,
    keys: KeyResolver,
}

impl TokenVerifier {
    pub fn new(config: IdpConfig, keys: KeyResolver) -> Self {
        Self { config, keys }
    }

    pub fn config(&self) -> &IdpConfig {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    /// Verify signature, expiry and audience, returning the raw claims.
    ///
    /// A signature mismatch triggers one forced key refetch and one retry, to
    /// ride out provider key rotation.
    pub async fn verify(&self, token: &str) -> AuthResult<TokenClaims> {
        ensure_accepted_algorithm(token)?;
        let key = self.keys.get_signing_key().await?;

        let payload = match self.decode(token, &key) {
            Err(err) if matches!(err.kind(), ErrorKind::InvalidSignature) => {
                let fresh = self.keys.refresh_after_mismatch(&key).await?;
                self.decode(token, &fresh)?
            }
            other => other?,
        };
        self.accept(payload)
    }

    /// Verify against a key the caller already holds. No refetch is attempted.
    pub fn verify_with_key(&self, token: &str, key: &SigningKey) -> AuthResult<TokenClaims> {
        ensure_accepted_algorithm(token)?;
        let payload = self.decode(token, key)?;
        self.accept(payload)
    }

    fn decode(&self, token: &str, key: &SigningKey) -> Result<Value, jsonwebtoken::errors::Error> {
        decode::<Value>(token, key.decoding_key(), &self.validation()).map(|data| data.claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ACCEPTED_ALGORITHM);
        validation.leeway = self.config.leeway_seconds.into();
        match self.config.audience_policy {
            AudiencePolicy::Enforce => {
                // jsonwebtoken only checks `aud` when the claim is present
                validation.set_required_spec_claims(&["exp", "aud"]);
                validation.set_audience(&[&self.config.client_id]);
            }
            AudiencePolicy::Tolerate => validation.validate_aud = false,
        }
        validation
    }

    fn accept(&self, payload: Value) -> AuthResult<TokenClaims> {
        let claims = TokenClaims::try_from(payload)?;
        if self.config.audience_policy == AudiencePolicy::Tolerate
            && !claims.audience().iter().any(|aud| aud == &self.config.client_id)
        {
            warn!(
                client_id = %self.config.client_id,
                audience = ?claims.audience(),
                "accepting token with mismatched audience"
            );
        }
        debug!(subject = claims.subject().unwrap_or_default(), "verified token");
        Ok(claims)
    }
}

fn ensure_accepted_algorithm(token: &str) -> AuthResult<()> {
    let header = decode_header(token)
        .map_err(|err| AuthError::InvalidToken(format!("malformed token header: {err}")))?;
    if header.alg != ACCEPTED_ALGORITHM {
        return Err(AuthError::InvalidToken(format!(
            "unsupported signing algorithm {:?}",
            header.alg
        )));
    }
    Ok(())
}
