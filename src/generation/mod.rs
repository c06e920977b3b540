//! 생성 모듈 - 로컬 언어 모델 호출
//!
//! 생성 모델은 Ollama 호환 `/api/generate` 엔드포인트 뒤의 블랙박스입니다.
//! 디코딩 파라미터는 요청마다 바뀌지 않는 고정값입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let generator = OllamaGenerator::new(&LlmConfig::default())?;
//! let text = generator.complete("What is CKD stage G3a?").await?;
//! ```

mod prompt;
mod service;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::embedding::OllamaError;

pub use prompt::{build_rag_prompt, PatientInfo};
pub use service::{AdviceService, GenerationError, RagRequest};

// ============================================================================
// TextGenerator Trait
// ============================================================================

/// 텍스트 생성기 트레이트
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 프롬프트 완성 (첫 번째 후보를 그대로 반환)
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// 생성기 이름
    fn name(&self) -> &str;
}

/// 고정 디코딩 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub context_window: u32,
}

impl From<&LlmConfig> for DecodingParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            context_window: config.context_window,
        }
    }
}

// ============================================================================
// Ollama Generator
// ============================================================================

/// Ollama 생성 구현체
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-completion
#[derive(Debug)]
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: reqwest::Client,
    params: DecodingParams,
}

/// Ollama 생성 요청 본문
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// Ollama 디코딩 옵션
#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
    num_ctx: u32,
}

/// Ollama 생성 응답
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    /// 설정으로 생성
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
            params: DecodingParams::from(config),
        })
    }

    pub fn params(&self) -> DecodingParams {
        self.params
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn request<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: self.params.max_tokens,
                temperature: self.params.temperature,
                top_p: self.params.top_p,
                num_ctx: self.params.context_window,
            },
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        tracing::debug!("Generating with {} ({} prompt chars)", self.model, prompt.chars().count());

        let response = self
            .client
            .post(self.endpoint())
            .json(&self.request(prompt))
            .send()
            .await
            .context("Failed to send generation request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
                anyhow::bail!("Generation API error ({}): {}", status, error.error);
            }
            anyhow::bail!("Generation API error ({}): {}", status, body);
        }

        let generated: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generation response")?;

        Ok(generated.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 설정으로 생성기 생성
pub fn create_generator(config: &LlmConfig) -> Result<OllamaGenerator> {
    let generator = OllamaGenerator::new(config)?;
    tracing::info!(
        "Using generation model {} at {} (max_tokens: {}, temperature: {})",
        config.model,
        config.base_url,
        config.max_tokens,
        config.temperature
    );
    Ok(generator)
}

// ============================================================================
// Tests
// ============================================================================
