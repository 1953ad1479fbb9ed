use axum::{extract::State, http::header, response::IntoResponse, Json};

use crate::api::{state::AppState, types::*};

/// GET /events
pub async fn list_events(State(state): State<AppState>) -> Json<EventsResponse> {
    let events = state.query.store().snapshot().await;
    let active_loops = events.iter().filter(|e| e.loop_active).count();

    Json(EventsResponse {
        total: events.len(),
        active_loops,
        events,
    })
}

/// GET /health -- lightweight liveness probe
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (events, active_loops) = state.query.store().counts().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        mode: state.mode_name().to_string(),
        events,
        active_loops,
        uptime_secs: state.uptime_seconds(),
    })
}

/// GET /metrics -- Prometheus text format
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (events, active_loops) = state.query.store().counts().await;
    let body = state
        .metrics
        .prometheus(events, active_loops, state.uptime_seconds());

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
