use api_service::{build_router, load_service_config, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_service_config()?;
    let state = AppState::from_config(&config)?;

    // Warm the key cache; a failure here is retried on the first request.
    if let Err(err) = state.verifier.keys().get_signing_key().await {
        warn!(error = %err, "initial realm key fetch failed");
    }

    let app = build_router(state);
    let addr = config.bind_addr();

    info!(%addr, realm = %config.idp.realm, "starting api-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
