//! Vector Store - 벡터 저장 트레이트 및 유사도 유틸리티
//!
//! 검색은 저장된 모든 청크에 대한 정확한 코사인 유사도 전수 스캔입니다.
//! 가이드라인 문서 규모에서만 쓰는 것을 전제로 합니다 (ANN 인덱스 없음).

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    /// 청크 ID (UUID v4)
    pub chunk_id: String,
    /// 청크 텍스트
    pub content: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// 청크 ID
    pub chunk_id: String,
    /// 청크 텍스트
    pub content: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// `scan`은 삽입 순서를 보존해야 합니다. 동점 정렬이 이 순서에 의존합니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 기존 청크 전부 삭제 (재수집 전 drop-and-recreate)
    async fn reset(&self) -> Result<()>;

    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 전체 엔트리 (삽입 순)
    async fn scan(&self) -> Result<Vec<VectorEntry>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 결과는 -1.0 ~ 1.0 범위이며, 길이가 다르거나 영벡터면 0.0입니다.
/// 무한대·오버플로로 유한한 값이 나오지 않으면 역시 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// 전수 스캔 후 유사도 상위 `top_k` 반환
///
/// 안정 정렬이므로 동점은 삽입 순서를 유지합니다.
/// 차원이 다른 엔트리가 있으면 에러를 반환합니다.
pub fn rank_by_similarity(
    query: &[f32],
    entries: Vec<VectorEntry>,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    if let Some(bad) = entries.iter().find(|e| e.embedding.len() != query.len()) {
        anyhow::bail!(
            "Embedding dimension mismatch: query has {}, chunk {} has {}",
            query.len(),
            bad.chunk_id,
            bad.embedding.len()
        );
    }

    let mut scored: Vec<SearchResult> = entries
        .into_iter()
        .map(|entry| SearchResult {
            similarity: cosine_similarity(query, &entry.embedding),
            chunk_id: entry.chunk_id,
            content: entry.content,
        })
        .collect();

    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(top_k);

    Ok(scored)
}

// ============================================================================
// Tests
// ============================================================================
