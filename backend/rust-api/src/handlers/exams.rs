use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::AppJson,
    models::{
        account::CurrentAccount,
        event::{Event, ExamDetails},
        question::{QuestionPublic, SubmitExamRequest},
        result::{EvaluateAnswerRequest, ResultView},
    },
    services::{
        evaluation_service::EvaluationService, event_service::EventService,
        result_service::ResultService, AppState,
    },
};

/// Exam as handed to a taker: metadata plus answer-key-free questions.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub exam_details: ExamDetails,
    pub questions: Vec<QuestionPublic>,
}

impl ExamView {
    fn new(event: Event, questions: Vec<QuestionPublic>) -> Self {
        ExamView {
            id: event.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: event.title,
            description: event.description,
            exam_details: event.exam_details,
            questions,
        }
    }
}

/// GET /api/v1/exams/{id} - Exam with questions, answer key stripped
pub async fn get_exam(
    State(state): State<Arc<AppState>>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exam_id = EventService::parse_id(&exam_id)?;
    let service = EvaluationService::new(state.client.clone(), state.mongo.clone());
    let (event, questions) = service.get_exam_for_taker(&exam_id).await?;
    Ok(Json(ExamView::new(event, questions)))
}

/// POST /api/v1/exams/{id}/submit - Submit answers for grading
pub async fn submit_exam(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    Path(exam_id): Path<String>,
    AppJson(req): AppJson<SubmitExamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.answers.is_empty() {
        return Err(ApiError::Validation(
            "At least one answer is required".to_string(),
        ));
    }

    let exam_id = EventService::parse_id(&exam_id)?;
    let service = EvaluationService::new(state.client.clone(), state.mongo.clone());
    let outcome = service.submit_exam(&exam_id, account.id, req).await?;

    if outcome.show_results_immediately {
        Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Exam submitted successfully",
                "result": ResultView::from(&outcome.result),
            })),
        ))
    } else {
        Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Exam submitted successfully. Results will be available later.",
                "resultId": outcome.result.id.map(|id| id.to_hex()),
            })),
        ))
    }
}

/// GET /api/v1/exams/{id}/results - Attempts for one exam. Admins see every
/// attempt plus an aggregate summary; users see their own attempts.
pub async fn exam_results(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    Path(exam_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exam_id = EventService::parse_id(&exam_id)?;
    let service = ResultService::new(state.mongo.clone());
    let results = service.exam_results(&exam_id, &account).await?;

    if account.is_admin() {
        let statistics = service.exam_statistics(&exam_id).await?;
        return Ok(Json(serde_json::json!({
            "results": results,
            "statistics": statistics,
        })));
    }
    Ok(Json(serde_json::json!({ "results": results })))
}

/// PUT /api/v1/exams/{examId}/results/{resultId}/answers/{answerId}/evaluate
/// Manually grade a subjective answer (admin only)
pub async fn evaluate_answer(
    State(state): State<Arc<AppState>>,
    Path((exam_id, result_id, answer_id)): Path<(String, String, String)>,
    AppJson(req): AppJson<EvaluateAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let exam_id = EventService::parse_id(&exam_id)?;
    let result_id = EventService::parse_id(&result_id)?;
    let answer_id = EventService::parse_id(&answer_id)?;

    let service = EvaluationService::new(state.client.clone(), state.mongo.clone());
    let result = service
        .evaluate_answer(&exam_id, &result_id, &answer_id, req)
        .await?;

    Ok(Json(ResultView::from(&result)))
}

/// POST /api/v1/exams/{examId}/results/{resultId}/certificate
/// Issue (or return the already issued) certificate for a passed result
pub async fn issue_certificate(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    Path((exam_id, result_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let exam_id = EventService::parse_id(&exam_id)?;
    let result_id = EventService::parse_id(&result_id)?;

    let service = EvaluationService::new(state.client.clone(), state.mongo.clone());
    let certificate = service
        .issue_certificate(&exam_id, &result_id, &account)
        .await?;

    Ok(Json(certificate))
}
