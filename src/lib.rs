//! ckd-advisor - CKD 위험도 분류 + 가이드라인 RAG 조언 서비스
//!
//! 검사값(크레아티닌, UACR)으로 KDIGO 위험도를 계산하고,
//! KDIGO 2024 가이드라인 청크를 코사인 유사도로 검색해
//! 로컬 언어 모델에 조언을 요청합니다.

pub mod cli;
pub mod clinical;
pub mod config;
pub mod embedding;
pub mod error;
pub mod etl;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod prediction;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use clinical::{assess, classify_risk, estimate_egfr, RiskAssessment, RiskStage, Sex};
pub use config::{get_data_dir, AppConfig};
pub use embedding::{create_embedder, EmbeddingProvider, OllamaEmbedding};
pub use error::ApiError;
pub use etl::{run_etl, DerivedStore, EtlConfig, EtlReport, PatientDerived};
pub use generation::{AdviceService, OllamaGenerator, RagRequest, TextGenerator};
pub use knowledge::{
    ChunkConfig, Chunker, DocumentIngestor, LanceVectorStore, MemoryVectorStore, Retriever,
    SearchResult, VectorEntry, VectorStore,
};
pub use prediction::{ClassifierRegistry, LogisticModel, PredictError};
pub use server::{build_router, AppState};
