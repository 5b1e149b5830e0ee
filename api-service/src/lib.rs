pub mod app;
pub mod config;
pub mod handlers;
pub mod metrics;

pub use app::{build_router, AppState};
pub use config::{load_service_config, ServiceConfig};
