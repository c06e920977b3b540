//! API 핸들러

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::etl::HistoryEntry;
use crate::generation::RagRequest;

use super::state::AppState;

/// 본문 JSON 파싱 실패도 `{error}` 형식으로 응답
fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

// ============================================================================
// Generation
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub result: String,
}

/// POST /generate - 컨텍스트 없는 생성
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request = parse_body(payload)?;
    let result = state.advisor().generate(&request.prompt).await?;
    Ok(Json(GenerateResponse { result }))
}

/// POST /generate_rag - 가이드라인 검색 + 생성
pub async fn generate_rag(
    State(state): State<AppState>,
    payload: Result<Json<RagRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request = parse_body(payload)?;
    tracing::info!("RAG request ({} chars)", request.prompt.chars().count());

    let result = state.advisor().generate_rag(&request).await?;
    Ok(Json(GenerateResponse { result }))
}

// ============================================================================
// Prediction
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(rename = "type")]
    pub model_type: Option<String>,
    pub measurement: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub probability: f64,
}

/// POST /predict - 측정 유형별 분류기 확률
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let request = parse_body(payload)?;

    let model_type = request
        .model_type
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Model type is required".to_string()))?;
    let measurement = request
        .measurement
        .filter(|m| !m.is_null())
        .ok_or_else(|| ApiError::BadRequest("Measurement is required".to_string()))?;

    let probability = state.classifiers().predict(&model_type, &measurement)?;
    Ok(Json(PredictResponse { probability }))
}

// ============================================================================
// Patients / Health
// ============================================================================

/// GET /patients/:id/history - 파생 위험도 이력
pub async fn patient_history(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let store = state
        .derived()
        .ok_or_else(|| ApiError::NotFound("Derived risk table is not available".to_string()))?;

    let history = store
        .patient_history(&patient_id)
        .map_err(ApiError::internal)?;
    Ok(Json(history))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let chunks = state
        .advisor()
        .retriever()
        .chunk_count()
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "chunks": chunks,
        "classifiers": state.classifiers().len(),
        "history": state.derived().is_some(),
    })))
}
