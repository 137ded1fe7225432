//! Health Check API Handler
//!
//! Simple health check endpoint for monitoring.

use axum::{Json, response::IntoResponse};

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "message": "pitboss is running",
        "timestamp": chrono::Utc::now(),
    }))
}
