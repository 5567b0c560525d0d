use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{glideins, handlers, middleware::metrics_middleware, sites};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, status and config
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::get_status))
        .route("/config", get(handlers::get_config))
        // Sites
        .route("/sites", post(sites::create_site).get(sites::list_sites))
        .route("/sites/{id}", get(sites::get_site))
        .route("/sites/{id}/submit", post(sites::submit_site))
        .route("/sites/{id}/remove", post(sites::remove_site))
        .route("/sites/{id}/history", get(sites::site_history))
        // Glideins
        .route(
            "/glideins",
            post(glideins::create_glidein).get(glideins::list_glideins),
        )
        .route("/glideins/{id}", get(glideins::get_glidein))
        .route("/glideins/{id}/submit", post(glideins::submit_glidein))
        .route("/glideins/{id}/remove", post(glideins::remove_glidein))
        .route("/glideins/{id}/history", get(glideins::glidein_history));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
