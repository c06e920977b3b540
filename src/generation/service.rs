//! Advice Service - 단순 생성 / RAG 생성
//!
//! 빈 프롬프트는 모델을 호출하기 전에 거절합니다.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::clinical::RiskStage;
use crate::knowledge::Retriever;

use super::prompt::{build_rag_prompt, PatientInfo};
use super::TextGenerator;

/// 생성 실패 유형
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 프롬프트 누락 (클라이언트 오류)
    #[error("Prompt is required")]
    EmptyPrompt,

    /// 가이드라인 검색 실패 (임베딩 서버·벡터 저장소)
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// 생성 모델 실패
    #[error("Generation failed: {0}")]
    Model(String),
}

/// RAG 요청 본문
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RagRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub egfr: Option<f64>,
    #[serde(default)]
    pub uacr: Option<f64>,
    #[serde(default)]
    pub risk: Option<RiskStage>,
}

impl RagRequest {
    pub fn patient(&self) -> PatientInfo {
        PatientInfo {
            egfr: self.egfr,
            uacr: self.uacr,
            risk: self.risk,
        }
    }
}

/// 조언 생성 서비스
pub struct AdviceService {
    generator: Arc<dyn TextGenerator>,
    retriever: Retriever,
    top_k: usize,
}

impl AdviceService {
    pub fn new(generator: Arc<dyn TextGenerator>, retriever: Retriever, top_k: usize) -> Self {
        Self {
            generator,
            retriever,
            top_k,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// 컨텍스트 없는 단순 생성
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        self.complete(prompt).await
    }

    /// 가이드라인 검색 + 환자 정보로 생성
    pub async fn generate_rag(&self, request: &RagRequest) -> Result<String, GenerationError> {
        if request.prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let chunks = self
            .retriever
            .retrieve(&request.prompt, self.top_k)
            .await
            .map_err(|e| GenerationError::Retrieval(format!("{:#}", e)))?;

        if chunks.is_empty() {
            tracing::warn!("No guideline context retrieved; generating without context");
        } else {
            tracing::info!("Using {} guideline chunks as context", chunks.len());
        }

        let prompt = build_rag_prompt(&request.prompt, &request.patient(), &chunks);
        self.complete(&prompt).await
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.generator
            .complete(prompt)
            .await
            .map_err(|e| GenerationError::Model(format!("{:#}", e)))
    }
}
