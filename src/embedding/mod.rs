//! 임베딩 모듈 - 로컬 임베딩 서버를 통한 텍스트 벡터화
//!
//! 가이드라인 청크와 질의를 같은 모델로 벡터화합니다.
//! 기본값은 Ollama의 `all-minilm` (paraphrase-MiniLM 계열, 384차원)입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::new(&EmbeddingConfig::default())?;
//! let embedding = embedder.embed("low eGFR and albuminuria").await?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
/// 수집과 검색은 반드시 같은 프로바이더를 사용해야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// Ollama 임베딩 구현체
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings
#[derive(Debug)]
pub struct OllamaEmbedding {
    base_url: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
}

/// Ollama 임베딩 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Ollama 임베딩 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Ollama 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaError {
    pub(crate) error: String,
}

impl OllamaEmbedding {
    /// 설정으로 생성
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.dimension == 0 {
            anyhow::bail!("Invalid dimension: 0. Embedding dimension must be positive");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
            dimension: config.dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
                anyhow::bail!("Embedding API error ({}): {}", status, error.error);
            }
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let embed_response: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        if embed_response.embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: model '{}' returned {}, expected {}",
                self.model,
                embed_response.embedding.len(),
                self.dimension
            );
        }

        if embed_response.embedding.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("Embedding model '{}' returned non-finite values", self.model);
        }

        Ok(embed_response.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정으로 임베딩 프로바이더 생성
pub fn create_embedder(config: &EmbeddingConfig) -> Result<OllamaEmbedding> {
    let embedder = OllamaEmbedding::new(config)?;
    tracing::info!(
        "Using embedding model {} at {} (dimension: {})",
        config.model,
        config.base_url,
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
