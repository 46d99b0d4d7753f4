//! HTTP surface.
//!
//! ```text
//! GET    /health
//! POST   /api/container/create
//! GET    /api/container/list
//! GET    /api/container/stats
//! POST   /api/container/start/:name
//! POST   /api/container/stop/:name
//! DELETE /api/container/delete/:name
//! GET    /api/container/logs/:name
//! ```

mod error;
pub mod handlers;
pub mod models;

use crate::auth::TokenVerifier;
use crate::manager::LifecycleManager;
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LifecycleManager>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(manager: Arc<LifecycleManager>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { manager, verifier }
    }
}

pub fn build_router(state: AppState) -> Router {
    let containers = Router::new()
        .route("/create", post(handlers::create))
        .route("/list", get(handlers::list))
        .route("/stats", get(handlers::stats))
        .route("/start/:name", post(handlers::start))
        .route("/stop/:name", post(handlers::stop))
        .route("/delete/:name", delete(handlers::delete))
        .route("/logs/:name", get(handlers::logs));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/container", containers)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
