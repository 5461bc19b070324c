//! Classification API handlers
//!
//! POST /api/v1/classification/session starts a run on a raw JPEG/PNG body.
//! The GET endpoints read stored sessions and average quality summaries.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{ClassificationSession, LotAverageQuality, OverallAverageQuality, SessionStatus},
    AppState,
};

/// Largest accepted image upload
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// POST /api/v1/classification/session query parameters
#[derive(Debug, Deserialize)]
pub struct StartSessionQuery {
    pub coffee_lot_id: i64,
    pub user_id: i64,
}

/// POST /api/v1/classification/session
///
/// 201 with the completed session, 500 when classification failed.
pub async fn start_session(
    State(state): State<AppState>,
    Query(query): Query<StartSessionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ClassificationSession>)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if !ACCEPTED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported content type '{}', expected image/jpeg or image/png",
            content_type
        )));
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("Image body is empty".to_string()));
    }

    let session = state
        .orchestrator
        .start_classification_session(query.coffee_lot_id, &body, query.user_id)
        .await;

    match session.status() {
        SessionStatus::Completed => Ok((StatusCode::CREATED, Json(session))),
        _ => Err(ApiError::Internal(format!(
            "Classification failed: {}",
            session.error_message().unwrap_or("unknown error")
        ))),
    }
}

/// GET /api/v1/classification/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ClassificationSession>>> {
    let sessions = state.queries.get_all_sessions().await?;
    if sessions.is_empty() {
        return Err(ApiError::NotFound(
            "No classification sessions found".to_string(),
        ));
    }
    Ok(Json(sessions))
}

/// GET /api/v1/classification/sessions/coffee-lot/:coffee_lot_id
pub async fn sessions_by_coffee_lot(
    State(state): State<AppState>,
    Path(coffee_lot_id): Path<i64>,
) -> ApiResult<Json<Vec<ClassificationSession>>> {
    let sessions = state.queries.get_sessions_by_coffee_lot(coffee_lot_id).await?;
    if sessions.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No classification sessions for coffee lot {}",
            coffee_lot_id
        )));
    }
    Ok(Json(sessions))
}

/// GET /api/v1/classification/session/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ClassificationSession>> {
    state
        .queries
        .get_session_by_id(session_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Classification session {}", session_id)))
}

/// GET /api/v1/classification/overall-average-quality
pub async fn overall_average_quality(
    State(state): State<AppState>,
) -> ApiResult<Json<OverallAverageQuality>> {
    state
        .queries
        .get_overall_average_quality()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No grain analyses found".to_string()))
}

/// GET /api/v1/classification/average-quality/coffee-lot/:coffee_lot_id
pub async fn average_quality_by_coffee_lot(
    State(state): State<AppState>,
    Path(coffee_lot_id): Path<i64>,
) -> ApiResult<Json<LotAverageQuality>> {
    state
        .queries
        .get_average_quality_by_coffee_lot(coffee_lot_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!("No grain analyses for coffee lot {}", coffee_lot_id))
        })
}

/// Build classification routes
pub fn classification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/classification/session", post(start_session))
        .route("/api/v1/classification/session/:session_id", get(get_session))
        .route("/api/v1/classification/sessions", get(list_sessions))
        .route(
            "/api/v1/classification/sessions/coffee-lot/:coffee_lot_id",
            get(sessions_by_coffee_lot),
        )
        .route(
            "/api/v1/classification/overall-average-quality",
            get(overall_average_quality),
        )
        .route(
            "/api/v1/classification/average-quality/coffee-lot/:coffee_lot_id",
            get(average_quality_by_coffee_lot),
        )
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES))
}
