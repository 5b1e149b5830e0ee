use anyhow::Result;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::app::AppState;

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    token_refreshes: IntCounter,
    rejections: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let token_refreshes = IntCounter::new(
            "auth_token_refresh_total",
            "Count of responses that carried a transparently refreshed token pair",
        )?;
        registry.register(Box::new(token_refreshes.clone()))?;

        let rejections = IntCounterVec::new(
            Opts::new(
                "auth_rejections_total",
                "Count of 401/403 responses grouped by error code",
            ),
            &["code"],
        )?;
        registry.register(Box::new(rejections.clone()))?;

        Ok(Self {
            registry,
            token_refreshes,
            rejections,
        })
    }

    pub fn token_refreshed(&self) {
        self.token_refreshes.inc();
    }

    pub fn rejection(&self, code: &str) {
        self.rejections.with_label_values(&[code]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}

/// Counts refreshed responses and auth rejections. Must wrap the refresh
/// layer so it sees the headers that layer adds.
pub async fn track_auth_outcomes(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let resp = next.run(req).await;
    let metrics = &state.metrics;

    let refreshed_header = &state.refresher.config().access_token_response_header;
    if resp.headers().contains_key(refreshed_header) {
        metrics.token_refreshed();
    }

    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let code = resp
            .headers()
            .get("X-Error-Code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        metrics.rejection(code);
    }
    resp
}
