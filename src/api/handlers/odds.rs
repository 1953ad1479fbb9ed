use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::api::{state::AppState, types::*};
use crate::error::OddsError;
use crate::services::{QueryMode, QueryResponse};

impl IntoResponse for QueryResponse {
    fn into_response(self) -> Response {
        match self {
            QueryResponse::Ready(record) => (StatusCode::OK, Json(record)).into_response(),
            QueryResponse::Pending { message, .. } => {
                (StatusCode::ACCEPTED, Json(MessageResponse { message })).into_response()
            }
            QueryResponse::Unavailable { message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(MessageResponse { message }),
            )
                .into_response(),
            QueryResponse::InvalidRequest { error } => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
        }
    }
}

/// GET /
pub async fn welcome(State(state): State<AppState>) -> Json<WelcomeResponse> {
    let usage = match state.mode_name() {
        "single" => "GET /odds".to_string(),
        _ => "GET /odds?event=<event id>".to_string(),
    };

    Json(WelcomeResponse {
        message: "Welcome to the odds API".to_string(),
        mode: state.mode_name().to_string(),
        usage,
    })
}

/// GET /odds?event=<id>
pub async fn get_odds(
    State(state): State<AppState>,
    Query(params): Query<EventQuery>,
) -> QueryResponse {
    let response = state.query.handle_query(params.event.as_deref()).await;
    debug!("Odds query for {:?}: {:?}", params.event, response);
    response
}

/// GET /odds/history?event=<id>
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<EventQuery>,
) -> std::result::Result<Json<HistoryResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.query.history(params.event.as_deref()).await {
        Ok(records) => Ok(Json(HistoryResponse {
            event: resolved_event(&state, params.event),
            records: records.into_iter().map(HistoryEntry::from).collect(),
        })),
        Err(e) => {
            let status = match e {
                OddsError::ClientInput(_) => StatusCode::BAD_REQUEST,
                OddsError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((status, Json(ErrorResponse { error: e.to_string() })))
        }
    }
}

fn resolved_event(state: &AppState, requested: Option<String>) -> String {
    match state.query.mode() {
        QueryMode::Single { event_id } => event_id.clone(),
        QueryMode::Multi => requested
            .map(|e| e.trim().to_string())
            .unwrap_or_default(),
    }
}
