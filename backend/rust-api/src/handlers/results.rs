use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    models::account::CurrentAccount,
    services::{event_service::EventService, result_service::ResultService, AppState},
};

/// GET /api/v1/results/leaderboard/{examId} - Top scores, best attempt per user
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exam_id = EventService::parse_id(&exam_id)?;
    let service = ResultService::new(state.mongo.clone());
    let entries = service.leaderboard(&exam_id).await?;
    Ok(Json(entries))
}

/// GET /api/v1/results/statistics - Statistics for every exam (admin only)
pub async fn all_statistics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ResultService::new(state.mongo.clone());
    let entries = service.all_exam_statistics().await?;
    Ok(Json(entries))
}

/// GET /api/v1/results/statistics/{examId} - Statistics for one exam (admin only)
pub async fn exam_statistics(
    State(state): State<Arc<AppState>>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exam_id = EventService::parse_id(&exam_id)?;
    let service = ResultService::new(state.mongo.clone());
    let stats = service.exam_statistics(&exam_id).await?;
    Ok(Json(stats))
}

/// GET /api/v1/results/performance/{userId} - Overall and monthly performance
pub async fn user_performance(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = EventService::parse_id(&user_id)?;
    let service = ResultService::new(state.mongo.clone());
    let performance = service.user_performance(&user_id, &account).await?;
    Ok(Json(performance))
}

/// GET /api/v1/results/{resultId} - Full result with per-answer detail
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    Path(result_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result_id = EventService::parse_id(&result_id)?;
    let service = ResultService::new(state.mongo.clone());
    let result = service.get_result(&result_id, &account).await?;
    Ok(Json(result))
}
