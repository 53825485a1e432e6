use axum::{routing::get, Router};
use std::sync::Arc;

use crate::config::AgentConfig;

pub mod error;
pub mod routes;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AgentConfig>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(config: Arc<AgentConfig>) -> Router {
    let app_state = Arc::new(AppState { config });

    Router::new()
        .route("/api/health", get(health_check_handler))
        .merge(routes::iperf3_routes::iperf3_router())
        .with_state(app_state)
}
