//! HTTP 서버
//!
//! | 경로 | 설명 |
//! |---|---|
//! | `POST /generate` | 단순 생성 |
//! | `POST /generate_rag` | 가이드라인 RAG 생성 |
//! | `POST /predict` | 분류기 확률 |
//! | `GET /patients/:id/history` | 파생 위험도 이력 |
//! | `GET /health` | 상태 |

mod routes;
mod state;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;

pub use routes::{GenerateResponse, PredictResponse};
pub use state::AppState;

/// 라우터 생성
pub fn build_router(state: AppState) -> Router {
    // CORS 완전 개방
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate", post(routes::generate))
        .route("/generate_rag", post(routes::generate_rag))
        .route("/predict", post(routes::predict))
        .route("/patients/:id/history", get(routes::patient_history))
        .route("/health", get(routes::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// 서버 시작 (종료될 때까지 대기)
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid address {}:{}", config.host, config.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Serving on http://{}", addr);

    axum::serve(listener, build_router(state))
        .await
        .context("Server error")?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::clinical::RiskStage;
    use crate::embedding::EmbeddingProvider;
    use crate::etl::{DerivedStore, PatientDerived};
    use crate::generation::{AdviceService, TextGenerator};
    use crate::knowledge::{MemoryVectorStore, Retriever, VectorEntry, VectorStore};
    use crate::prediction::{ClassifierRegistry, LogisticModel};
    use crate::testing::{FailingGenerator, KeywordEmbedding, RecordingGenerator};

    async fn state_with(
        generator: Arc<dyn TextGenerator>,
        derived: Option<DerivedStore>,
    ) -> AppState {
        let embedder = Arc::new(KeywordEmbedding::new());
        let store = Arc::new(MemoryVectorStore::new());
        let text = "Statin therapy is recommended.";
        store
            .insert_batch(&[VectorEntry {
                chunk_id: "c0".to_string(),
                content: text.to_string(),
                embedding: embedder.embed(text).await.unwrap(),
            }])
            .await
            .unwrap();

        let mut models = BTreeMap::new();
        models.insert(
            "creatinine".to_string(),
            LogisticModel {
                intercept: 0.0,
                coefficient: 0.0,
            },
        );

        AppState::new(
            AdviceService::new(generator, Retriever::new(embedder, store), 5),
            ClassifierRegistry::new(models),
            derived,
        )
    }

    async fn send(
        router: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_generate_empty_prompt_no_model_call() {
        let generator = Arc::new(RecordingGenerator::new("unused"));
        let router = build_router(state_with(generator.clone(), None).await);

        let (status, body) =
            send(router.clone(), "POST", "/generate", Some(json!({"prompt": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Prompt is required"}));

        let (status, body) = send(router, "POST", "/generate", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Prompt is required");
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_generate_returns_result() {
        let generator = Arc::new(RecordingGenerator::new("Stay hydrated."));
        let router = build_router(state_with(generator, None).await);

        let (status, body) = send(router, "POST", "/generate", Some(json!({"prompt": "Hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": "Stay hydrated."}));
    }

    #[tokio::test]
    async fn test_generate_rag_includes_context() {
        let generator = Arc::new(RecordingGenerator::new("advice"));
        let router = build_router(state_with(generator.clone(), None).await);

        let (status, body) = send(
            router,
            "POST",
            "/generate_rag",
            Some(json!({"prompt": "statin?", "egfr": 55.0, "uacr": 12.0, "risk": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "advice");

        let prompt = generator.last_prompt().unwrap();
        assert!(prompt.contains("## Chunk 1\nStatin therapy is recommended."));
        assert!(prompt.contains("UACR: 12.0 mg/g"));
    }

    #[tokio::test]
    async fn test_generate_rag_empty_prompt() {
        let generator = Arc::new(RecordingGenerator::new("unused"));
        let router = build_router(state_with(generator.clone(), None).await);

        let (status, body) =
            send(router, "POST", "/generate_rag", Some(json!({"egfr": 40.0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Prompt is required");
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_is_bad_gateway() {
        let router = build_router(state_with(Arc::new(FailingGenerator), None).await);
        let (status, body) = send(router, "POST", "/generate", Some(json!({"prompt": "Hi"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let generator = Arc::new(RecordingGenerator::new("unused"));
        let router = build_router(state_with(generator, None).await);

        let request = Request::builder()
            .method("POST")
            .uri("/generate")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_predict() {
        let generator = Arc::new(RecordingGenerator::new("unused"));
        let router = build_router(state_with(generator, None).await);

        let (status, body) = send(
            router.clone(),
            "POST",
            "/predict",
            Some(json!({"type": "creatinine", "measurement": 88.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"probability": 0.5}));

        let (status, body) = send(
            router.clone(),
            "POST",
            "/predict",
            Some(json!({"type": "potassium", "measurement": 4.1})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Model type 'potassium' not found"}));

        let (status, _) = send(
            router.clone(),
            "POST",
            "/predict",
            Some(json!({"type": "creatinine"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            router,
            "POST",
            "/predict",
            Some(json!({"type": "creatinine", "measurement": "high"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("high"));
    }

    #[tokio::test]
    async fn test_patient_history() {
        let dir = TempDir::new().unwrap();
        let derived = DerivedStore::open(&dir.path().join("ckd_post.db")).unwrap();
        let date = |d: &str| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap();
        derived
            .replace_all(&[
                PatientDerived {
                    patient_id: "P1".to_string(),
                    date: date("2024-01-10"),
                    egfr: Some(72.0),
                    uacr: None,
                    risk: None,
                },
                PatientDerived {
                    patient_id: "P1".to_string(),
                    date: date("2024-02-10"),
                    egfr: Some(72.0),
                    uacr: Some(12.0),
                    risk: Some(RiskStage::Moderate),
                },
            ])
            .unwrap();

        let generator = Arc::new(RecordingGenerator::new("unused"));
        let router = build_router(state_with(generator, Some(derived)).await);

        let (status, body) = send(router.clone(), "GET", "/patients/P1/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                {"date": "2024-01-10", "eGFR": 72.0, "uACR": null, "riskValue": null},
                {"date": "2024-02-10", "eGFR": 72.0, "uACR": 12.0, "riskValue": 2}
            ])
        );

        let (status, body) = send(router, "GET", "/patients/P9/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_history_without_derived_store() {
        let generator = Arc::new(RecordingGenerator::new("unused"));
        let router = build_router(state_with(generator, None).await);

        let (status, body) = send(router, "GET", "/patients/P1/history", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_health() {
        let generator = Arc::new(RecordingGenerator::new("unused"));
        let router = build_router(state_with(generator, None).await);

        let (status, body) = send(router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["chunks"], 1);
        assert_eq!(body["classifiers"], 1);
    }
}
