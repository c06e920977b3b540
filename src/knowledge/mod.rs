//! Knowledge 모듈 - 가이드라인 지식 저장소
//!
//! - Chunker: 구분자 기반 문자 단위 분할 (겹침 포함)
//! - VectorStore: 청크 + 임베딩 저장 (LanceDB / 메모리)
//! - Ingest: 원문 → 청크 → 임베딩 → 저장 (drop-and-recreate)
//! - Retriever: 코사인 유사도 전수 스캔으로 상위 K 검색

mod chunker;
mod ingest;
mod lance;
mod memory;
mod retriever;
mod vector;

// Re-exports
pub use chunker::{character_chunker, default_chunker, CharacterChunker, ChunkConfig, Chunker};
pub use ingest::{DocumentIngestor, IngestReport};
pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;
pub use retriever::Retriever;
pub use vector::{cosine_similarity, rank_by_similarity, SearchResult, VectorEntry, VectorStore};
