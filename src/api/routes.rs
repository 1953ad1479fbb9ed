use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // Dashboards poll from other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::welcome))
        // Odds endpoints
        .route("/odds", get(handlers::get_odds))
        .route("/odds/history", get(handlers::get_history))
        // System endpoints
        .route("/events", get(handlers::list_events))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(state)
        .layer(cors)
}
