use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use mongodb::bson::doc;
use std::sync::Arc;

use crate::services::AppState;

pub mod auth;
pub mod events;
pub mod exams;
pub mod results;

/// GET /health - Liveness plus a MongoDB ping
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.mongo.run_command(doc! { "ping": 1 }).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "database": "connected" })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded", "database": "unreachable" })),
            )
        }
    }
}
