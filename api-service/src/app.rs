use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use oidc_auth::{
    refresh_middleware, KeyResolver, RefreshInterceptor, TokenClient, TokenVerifier,
};

use crate::config::ServiceConfig;
use crate::handlers::{access_level, admin_ping, health, has_role, me, me_id, metrics_endpoint};
use crate::metrics::{track_auth_outcomes, AuthMetrics};

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub refresher: Arc<RefreshInterceptor>,
    pub metrics: Arc<AuthMetrics>,
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

impl FromRef<AppState> for Arc<AuthMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

impl AppState {
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let http_client = config
            .idp
            .http_client()
            .context("Failed to build identity provider HTTP client")?;

        let keys = KeyResolver::from_config(&config.idp, http_client.clone());
        let tokens = TokenClient::from_config(&config.idp, http_client);
        let verifier = Arc::new(TokenVerifier::new(config.idp.clone(), keys));
        let refresher = Arc::new(RefreshInterceptor::new(
            verifier.clone(),
            tokens,
            config.refresh.clone(),
        ));

        Ok(Self {
            verifier,
            refresher,
            metrics: Arc::new(AuthMetrics::new()?),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route("/me/id", get(me_id))
        .route("/me/access-level", get(access_level))
        .route("/me/roles/:role", get(has_role))
        .route("/admin/ping", get(admin_ping))
        .layer(from_fn_with_state(state.refresher.clone(), refresh_middleware));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .merge(protected)
        .layer(from_fn_with_state(state.clone(), track_auth_outcomes))
        .with_state(state)
}
