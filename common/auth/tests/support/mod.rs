#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use oidc_auth::{IdpConfig, KeyResolver, TokenClient, TokenVerifier};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const REALM: &str = "test";
pub const CLIENT_ID: &str = "backend";
pub const CLIENT_SECRET: &str = "s3cr3t";
pub const GOOD_REFRESH: &str = "good-refresh";

pub struct RealmKey {
    encoding: EncodingKey,
    bare_public: String,
}

impl RealmKey {
    pub fn generate() -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)?;
        let private_pem = private_key.to_pkcs1_pem(LineEnding::LF)?;
        let public_pem = private_key.to_public_key().to_public_key_pem(LineEnding::LF)?;
        Ok(Self {
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes())?,
            bare_public: public_pem
                .lines()
                .filter(|line| !line.starts_with("-----"))
                .collect(),
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        encode(&Header::new(Algorithm::RS256), claims, &self.encoding).expect("sign")
    }
}

pub fn claims_for(subject: &str, roles: &[&str], ttl_seconds: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": subject,
        "aud": CLIENT_ID,
        "iat": now,
        "exp": now + ttl_seconds,
        "preferred_username": "jdoe",
        "given_name": "Jane",
        "family_name": "Doe",
        "email": "jdoe@example.com",
        "email_verified": true,
        "realm_access": { "roles": ["offline_access"] },
        "resource_access": { CLIENT_ID: { "roles": roles } }
    })
}

struct RealmState {
    key: RwLock<Arc<RealmKey>>,
    key_fetches: AtomicUsize,
    token_calls: AtomicUsize,
    token_delay: Option<Duration>,
}

/// In-process stand-in for the identity provider: realm document plus
/// token endpoint, served over real HTTP.
pub struct FakeRealm {
    state: Arc<RealmState>,
    base_url: String,
    server: JoinHandle<()>,
}

impl FakeRealm {
    pub async fn start() -> Result<Self> {
        Self::start_with_delay(None).await
    }

    pub async fn start_with_delay(token_delay: Option<Duration>) -> Result<Self> {
        let state = Arc::new(RealmState {
            key: RwLock::new(Arc::new(RealmKey::generate()?)),
            key_fetches: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
            token_delay,
        });

        let router = Router::new()
            .route("/realms/:realm", get(realm_document))
            .route(
                "/realms/:realm/protocol/openid-connect/token",
                post(token_endpoint),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router.into_make_service()).await {
                eprintln!("fake realm server error: {err}");
            }
        });

        Ok(Self {
            state,
            base_url: format!("http://{addr}"),
            server,
        })
    }

    pub fn idp_config(&self) -> IdpConfig {
        IdpConfig::new(&self.base_url, REALM, CLIENT_ID).with_client_secret(CLIENT_SECRET)
    }

    pub fn verifier(&self) -> Arc<TokenVerifier> {
        let config = self.idp_config();
        let keys = KeyResolver::new(config.public_key_url(), Duration::from_secs(300))
            .expect("resolver");
        Arc::new(TokenVerifier::new(config, keys))
    }

    pub fn token_client(&self) -> TokenClient {
        let config = self.idp_config();
        TokenClient::new(config.token_url(), CLIENT_ID, config.client_secret.clone())
            .expect("token client")
    }

    pub fn key(&self) -> Arc<RealmKey> {
        self.state.key.read().expect("key lock").clone()
    }

    pub fn sign(&self, claims: &Value) -> String {
        self.key().sign(claims)
    }

    /// Replace the realm signing key, as a provider-side key rotation would.
    pub fn rotate(&self) -> Result<()> {
        *self.state.key.write().expect("key lock") = Arc::new(RealmKey::generate()?);
        Ok(())
    }

    pub fn key_fetches(&self) -> usize {
        self.state.key_fetches.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }
}

impl Drop for FakeRealm {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn realm_document(State(state): State<Arc<RealmState>>) -> Json<Value> {
    state.key_fetches.fetch_add(1, Ordering::SeqCst);
    let key = state.key.read().expect("key lock").clone();
    Json(json!({ "realm": REALM, "public_key": key.bare_public }))
}

async fn token_endpoint(
    State(state): State<Arc<RealmState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = state.token_delay {
        tokio::time::sleep(delay).await;
    }

    let client_ok = form.get("client_id").map(String::as_str) == Some(CLIENT_ID)
        && form.get("client_secret").map(String::as_str) == Some(CLIENT_SECRET);
    if !client_ok {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_client" })),
        )
            .into_response();
    }

    let grant = form.get("grant_type").map(String::as_str);
    let refresh = form.get("refresh_token").map(String::as_str);
    if grant != Some("refresh_token") || refresh != Some(GOOD_REFRESH) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Token is not active"
            })),
        )
            .into_response();
    }

    let key = state.key.read().expect("key lock").clone();
    let access_token = key.sign(&claims_for("user-1", &["user"], 300));
    Json(json!({
        "access_token": access_token,
        "refresh_token": "rotated-refresh",
        "token_type": "Bearer",
        "expires_in": 300,
        "refresh_expires_in": 1800
    }))
    .into_response()
}
