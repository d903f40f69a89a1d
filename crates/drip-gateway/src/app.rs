use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use drip_core::DripConfig;

use crate::instances::InstanceRouter;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: DripConfig,
    pub instances: InstanceRouter,
}

impl AppState {
    pub fn new(config: DripConfig, instances: InstanceRouter) -> Self {
        Self { config, instances }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/jobs", post(crate::http::jobs::submit_job))
        .route("/jobs/{job_id}", get(crate::http::jobs::job_status))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
