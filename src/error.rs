//! HTTP 경계 에러 타입
//!
//! 내부는 `anyhow::Result`를 쓰고, 핸들러에서 이 열거형으로 변환해
//! `{ "error": message }` 본문과 상태 코드로 응답합니다.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::generation::GenerationError;
use crate::prediction::PredictError;

/// API 에러
#[derive(Debug, Error)]
pub enum ApiError {
    /// 필수 입력 누락·형식 오류 (400)
    #[error("{0}")]
    BadRequest(String),

    /// 대상 없음 (404)
    #[error("{0}")]
    NotFound(String),

    /// 예측 실패 (422)
    #[error("{0}")]
    Unprocessable(String),

    /// 임베딩·생성 모델 실패 (502)
    #[error("{0}")]
    Upstream(String),

    /// 그 외 (500)
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::EmptyPrompt => ApiError::BadRequest(err.to_string()),
            GenerationError::Retrieval(_) | GenerationError::Model(_) => {
                ApiError::Upstream(err.to_string())
            }
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PredictError::Invalid(_) => ApiError::Unprocessable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{} {}", status, self);
        } else {
            tracing::debug!("{} {}", status, self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
