use crate::api::AppState;
use crate::batch::{process_rows, BatchReport, BatchRow};
use crate::error::{AppError, Result};
use crate::metrics::gather_metrics;
use crate::ml::{ModelInfo, ModelType};
use crate::models::{PredictionResult, StudentRecord};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        model: state.service.metadata().name.clone(),
        model_type: state.service.metadata().model_type,
        n_features: state.service.transform().n_features(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub model: String,
    pub model_type: ModelType,
    pub n_features: usize,
}

/// Describe the loaded model
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.service.model_info())
}

/// Predict a single student
pub async fn predict(
    State(state): State<AppState>,
    payload: std::result::Result<Json<StudentRecord>, JsonRejection>,
) -> Result<Json<PredictionResult>> {
    let Json(record) = payload.map_err(|e| AppError::Serialization(e.body_text()))?;
    let result = state.service.predict_one(&record)?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchPredictRequest {
    #[validate(length(min = 1, max = 10000))]
    pub students: Vec<StudentRecord>,
}

/// Predict a cohort; per-student failures are embedded in the results
pub async fn predict_batch(
    State(state): State<AppState>,
    payload: std::result::Result<Json<BatchPredictRequest>, JsonRejection>,
) -> Result<Json<BatchReport>> {
    let Json(request) = payload.map_err(|e| AppError::Serialization(e.body_text()))?;
    request.validate()?;

    let rows: Vec<BatchRow> = request
        .students
        .into_iter()
        .enumerate()
        .map(|(index, record)| BatchRow {
            index,
            record: Ok(record),
        })
        .collect();

    let service = state.service.clone();
    let top_n = state.top_recommendations;
    let report = tokio::task::spawn_blocking(move || process_rows(&service, rows, top_n, true))
        .await
        .map_err(|e| AppError::Internal(format!("batch worker failed: {}", e)))?;

    Ok(Json(report))
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}
