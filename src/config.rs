//! 설정 모듈
//!
//! 기본값은 원천 시스템의 상수(청크 2000/100, 384차원, 512 토큰 등)를 따르고,
//! 환경변수와 CLI 플래그로 덮어씁니다.
//!
//! | 환경변수 | 대상 |
//! |---|---|
//! | `CKD_ADVISOR_DATA_DIR` | 데이터 디렉토리 |
//! | `OLLAMA_HOST` | 임베딩·생성 서버 URL |
//! | `CKD_EMBED_MODEL` | 임베딩 모델 |
//! | `CKD_LLM_MODEL` | 생성 모델 |
//! | `CKD_CLASSIFIERS` | 분류기 JSON 경로 |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::etl::EtlConfig;
use crate::knowledge::ChunkConfig;

/// Ollama 기본 주소
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.ckd-advisor/)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CKD_ADVISOR_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ckd-advisor")
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 임베딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: "all-minilm".to_string(),
            dimension: 384,
            timeout_secs: 30,
        }
    }
}

/// 생성 모델 설정 (디코딩 파라미터 고정값 포함)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// 최대 출력 토큰
    pub max_tokens: u32,
    pub temperature: f32,
    /// nucleus sampling 임계값
    pub top_p: f32,
    /// 컨텍스트 윈도우
    pub context_window: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: "llama3.2:3b".to_string(),
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            context_window: 8096,
            timeout_secs: 600,
        }
    }
}

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// RAG 프롬프트에 넣을 청크 수
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub chunking: ChunkConfig,
    pub etl: EtlConfig,
    /// 분류기 JSON 파일 (없으면 data_dir/classifiers.json)
    pub classifiers_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ckd-advisor"),
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkConfig::default(),
            etl: EtlConfig::default(),
            classifiers_path: None,
        }
    }
}

impl AppConfig {
    /// 기본값 + 환경변수
    pub fn from_env() -> Self {
        let ollama = env_or("OLLAMA_HOST", DEFAULT_OLLAMA_URL);

        let mut config = Self {
            data_dir: get_data_dir(),
            ..Default::default()
        };

        config.embedding.base_url = ollama.clone();
        config.embedding.model = env_or("CKD_EMBED_MODEL", &config.embedding.model);
        config.llm.base_url = ollama;
        config.llm.model = env_or("CKD_LLM_MODEL", &config.llm.model);
        config.classifiers_path = std::env::var("CKD_CLASSIFIERS")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        config
    }

    /// 가이드라인 벡터 저장소 (LanceDB 디렉토리)
    pub fn vector_path(&self) -> PathBuf {
        self.data_dir.join("guidelines.lance")
    }

    /// 파생 위험도 DB
    pub fn derived_db_path(&self) -> PathBuf {
        self.data_dir.join("ckd_post.db")
    }

    /// 분류기 JSON
    pub fn classifiers_file(&self) -> PathBuf {
        self.classifiers_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("classifiers.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_source_constants() {
        let config = AppConfig::default();
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.llm.max_tokens, 512);
        assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert!((config.llm.top_p - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.chunking.chunk_size, 2000);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_derived_paths() {
        let config = AppConfig {
            data_dir: PathBuf::from("/tmp/ckd"),
            ..Default::default()
        };
        assert_eq!(config.vector_path(), PathBuf::from("/tmp/ckd/guidelines.lance"));
        assert_eq!(config.derived_db_path(), PathBuf::from("/tmp/ckd/ckd_post.db"));
        assert_eq!(config.classifiers_file(), PathBuf::from("/tmp/ckd/classifiers.json"));
    }

    #[test]
    fn test_config_serializes() {
        let json = serde_json::to_value(AppConfig::default()).unwrap();
        assert_eq!(json["etl"]["creatinine_analyte"], "s_kreatinin");
        assert_eq!(json["llm"]["context_window"], 8096);
    }
}
