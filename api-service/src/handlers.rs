use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use oidc_auth::{AccessLevel, AdminOnly, AuthContext, AuthResult, Identity};
use serde_json::{json, Value};
use tracing::warn;

use crate::metrics::AuthMetrics;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(metrics): State<Arc<AuthMetrics>>) -> Response {
    match metrics.render() {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "Unable to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

pub async fn me_id(identity: Identity) -> AuthResult<Json<Value>> {
    let id = identity.user_id()?;
    Ok(Json(json!({ "id": id })))
}

pub async fn access_level(level: AccessLevel) -> Json<Value> {
    Json(json!({ "access_level": level }))
}

/// Boolean role check; never rejects for a missing role.
pub async fn has_role(auth: AuthContext, Path(role): Path<String>) -> Json<Value> {
    let granted = auth.has_role(&role);
    Json(json!({ "role": role, "granted": granted }))
}

pub async fn admin_ping(admin: AdminOnly) -> Json<Value> {
    Json(json!({ "status": "pong", "subject": admin.auth.claims.subject() }))
}
