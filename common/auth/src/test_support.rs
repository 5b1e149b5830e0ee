use std::sync::OnceLock;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

pub struct KeyMaterial {
    pub encoding: EncodingKey,
    pub public_pem: String,
}

impl KeyMaterial {
    fn generate() -> Self {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).expect("generate key");
        let private_pem = private_key.to_pkcs1_pem(LineEnding::LF).expect("private pem");
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("public pem");
        Self {
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
            public_pem,
        }
    }

    /// Public key as the realm document serves it: base64 without markers.
    pub fn bare_public_key(&self) -> String {
        self.public_pem
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect()
    }

    pub fn sign(&self, claims: &Value) -> String {
        encode(&Header::new(Algorithm::RS256), claims, &self.encoding).expect("sign token")
    }
}

pub fn primary_key() -> &'static KeyMaterial {
    static KEY: OnceLock<KeyMaterial> = OnceLock::new();
    KEY.get_or_init(KeyMaterial::generate)
}

pub fn rotated_key() -> &'static KeyMaterial {
    static KEY: OnceLock<KeyMaterial> = OnceLock::new();
    KEY.get_or_init(KeyMaterial::generate)
}

/// Keycloak-shaped access token payload, expiring `ttl_seconds` from now.
pub fn access_claims(subject: &str, client_id: &str, roles: &[&str], ttl_seconds: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": subject,
        "aud": client_id,
        "azp": client_id,
        "iat": now,
        "exp": now + ttl_seconds,
        "preferred_username": "jdoe",
        "email": "jdoe@example.com",
        "email_verified": true,
        "realm_access": { "roles": ["offline_access"] },
        "resource_access": { client_id: { "roles": roles } }
    })
}

pub fn realm_document(key: &KeyMaterial) -> Value {
    json!({ "realm": "test", "public_key": key.bare_public_key() })
}
