//! 테스트용 가짜 프로바이더
//!
//! 외부 모델 서버 없이 수집·검색·생성 경로를 검증하기 위한 결정적 구현입니다.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::generation::TextGenerator;

/// 키워드 출현 횟수 임베딩
///
/// 어휘 하나당 한 차원. 대소문자를 무시하고 부분 문자열로 셉니다.
pub struct KeywordEmbedding {
    vocabulary: [&'static str; Self::DIMENSION],
}

impl Default for KeywordEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordEmbedding {
    pub const DIMENSION: usize = 8;

    pub fn new() -> Self {
        Self {
            vocabulary: [
                "blood",
                "pressure",
                "statin",
                "sglt2",
                "albuminuria",
                "egfr",
                "diet",
                "dialysis",
            ],
        }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        Ok(self
            .vocabulary
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect())
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// 받은 프롬프트를 기록하고 고정 응답을 돌려주는 생성기
pub struct RecordingGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// 항상 실패하는 생성기 (업스트림 장애 시뮬레이션)
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("Generation API error (503): model unavailable")
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_embedding_default_counts_vocabulary() {
        let embedder = KeywordEmbedding::default();
        assert_eq!(embedder.dimension(), KeywordEmbedding::DIMENSION);

        let embedding = embedder.embed("Blood pressure, blood sugar").await.unwrap();
        assert_eq!(embedding.len(), KeywordEmbedding::DIMENSION);
        assert_eq!(embedding[0], 2.0);
        assert_eq!(embedding[1], 1.0);
        assert!(embedding[2..].iter().all(|v| *v == 0.0));
    }
}
