use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    models::{
        account::CurrentAccount,
        event::{
            AttendanceRequest, CreateEventRequest, EventFeedbackRequest, ListEventsQuery,
            UpdateEventRequest,
        },
        question::CreateQuestionRequest,
    },
    services::{event_service::EventService, AppState},
};

/// POST /api/v1/events - Create an event (admin only)
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    AppJson(req): AppJson<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = EventService::new(state.mongo.clone());
    let event = service.create_event(account.id, req).await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /api/v1/events - List events, drafts excluded unless filtered
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListEventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let service = EventService::new(state.mongo.clone());
    let events = service.list_events(query).await?;
    Ok(Json(events))
}

/// GET /api/v1/events/{id} - Event details
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = EventService::parse_id(&event_id)?;
    let service = EventService::new(state.mongo.clone());
    let event = service.get_event(&event_id).await?;
    Ok(Json(event))
}

/// PUT /api/v1/events/{id} - Update an event (admin only)
pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    AppJson(req): AppJson<UpdateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let event_id = EventService::parse_id(&event_id)?;
    let service = EventService::new(state.mongo.clone());
    let event = service.update_event(&event_id, req).await?;
    Ok(Json(event))
}

/// DELETE /api/v1/events/{id} - Delete an event and its questions (admin only)
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = EventService::parse_id(&event_id)?;
    let service = EventService::new(state.mongo.clone());
    service.delete_event(&event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/events/{id}/register - Register the caller for an event
pub async fn register(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = EventService::parse_id(&event_id)?;
    let service = EventService::new(state.mongo.clone());
    let event = service.register(&event_id, account.id).await?;
    Ok(Json(event))
}

/// POST /api/v1/events/{id}/attendance - Mark attendance (admin only)
pub async fn mark_attendance(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    AppJson(req): AppJson<AttendanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = EventService::parse_id(&event_id)?;
    let service = EventService::new(state.mongo.clone());
    service.mark_attendance(&event_id, req).await?;
    Ok(Json(serde_json::json!({ "message": "Attendance recorded" })))
}

/// POST /api/v1/events/{id}/feedback - Leave feedback on an attended event
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    Path(event_id): Path<String>,
    AppJson(req): AppJson<EventFeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let event_id = EventService::parse_id(&event_id)?;
    let service = EventService::new(state.mongo.clone());
    service.submit_feedback(&event_id, &account.id, req).await?;
    Ok(Json(serde_json::json!({ "message": "Feedback recorded" })))
}

/// POST /api/v1/events/{id}/questions - Add a question to an exam (admin only)
pub async fn add_question(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    AppJson(req): AppJson<CreateQuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let event_id = EventService::parse_id(&event_id)?;
    let service = EventService::new(state.mongo.clone());
    let question = service.add_question(&event_id, req).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// GET /api/v1/events/{id}/questions - Questions with answer key (admin only)
pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = EventService::parse_id(&event_id)?;
    let service = EventService::new(state.mongo.clone());
    let questions = service.list_questions(&event_id).await?;
    Ok(Json(questions))
}

/// DELETE /api/v1/events/{id}/questions/{questionId} - Remove a question (admin only)
pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Path((event_id, question_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = EventService::parse_id(&event_id)?;
    let question_id = EventService::parse_id(&question_id)?;
    let service = EventService::new(state.mongo.clone());
    service.delete_question(&event_id, &question_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
