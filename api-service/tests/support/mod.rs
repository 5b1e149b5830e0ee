#![allow(dead_code)]

use std::collections::HashMap;

use anyhow::Result;
use api_service::config::load_from;
use api_service::{build_router, AppState};
use axum::Router;
use chrono::Utc;
use httpmock::prelude::*;
use httpmock::Mock;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

pub const CLIENT_ID: &str = "api";

pub struct TestIdp {
    pub server: MockServer,
    encoding: EncodingKey,
}

impl TestIdp {
    /// Mock identity provider serving the realm document for a fresh key.
    pub async fn start() -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)?;
        let private_pem = private_key.to_pkcs1_pem(LineEnding::LF)?;
        let public_pem = private_key.to_public_key().to_public_key_pem(LineEnding::LF)?;
        let bare: String = public_pem
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect();

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/realms/shop");
                then.status(200)
                    .json_body(json!({ "realm": "shop", "public_key": bare }));
            })
            .await;

        Ok(Self {
            server,
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes())?,
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        encode(&Header::new(Algorithm::RS256), claims, &self.encoding).expect("sign")
    }

    pub fn token(&self, subject: &str, roles: &[&str], ttl_seconds: i64) -> String {
        let now = Utc::now().timestamp();
        self.sign(&json!({
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
        }))
    }

    /// Token endpoint accepting exactly `refresh_token` and answering with `access_token`.
    pub async fn accept_refresh(&self, refresh_token: &str, access_token: &str) -> Mock<'_> {
        let body = json!({
            "access_token": access_token,
            "refresh_token": "next-refresh",
            "token_type": "Bearer",
            "expires_in": 300
        });
        self.server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/realms/shop/protocol/openid-connect/token")
                    .x_www_form_urlencoded_tuple("grant_type", "refresh_token")
                    .x_www_form_urlencoded_tuple("refresh_token", refresh_token)
                    .x_www_form_urlencoded_tuple("client_id", CLIENT_ID);
                then.status(200).json_body(body);
            })
            .await
    }

    pub fn app(&self) -> Result<(Router, AppState)> {
        let vars: HashMap<&str, String> = HashMap::from([
            ("IDP_SERVER_URL", self.server.base_url()),
            ("IDP_REALM", "shop".to_string()),
            ("IDP_CLIENT_ID", CLIENT_ID.to_string()),
            ("IDP_CLIENT_SECRET", "s3cr3t".to_string()),
        ]);
        let config = load_from(|key| vars.get(key).cloned())?;
        let state = AppState::from_config(&config)?;
        Ok((build_router(state.clone()), state))
    }
}
