//! Retriever - 질의 임베딩 + 코사인 전수 스캔
//!
//! 수집 때와 같은 임베딩 프로바이더로 질의를 벡터화한 뒤
//! 저장된 모든 청크와 비교해 상위 `top_k`를 돌려줍니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::embedding::EmbeddingProvider;

use super::vector::{rank_by_similarity, SearchResult, VectorStore};

/// 가이드라인 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// 상위 `top_k` 청크 검색 (유사도 내림차순)
    ///
    /// 저장소가 비어 있으면 빈 결과를 반환합니다 (컨텍스트 없음).
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let entries = self.store.scan().await.context("Failed to scan vector store")?;
        if entries.is_empty() {
            tracing::warn!("Vector store is empty; no context available for query");
            return Ok(vec![]);
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let corpus = entries.len();
        let results = rank_by_similarity(&query_embedding, entries, top_k)?;

        tracing::debug!(
            "Retrieved {} of {} chunks (best score: {:?})",
            results.len(),
            corpus,
            results.first().map(|r| r.similarity)
        );

        Ok(results)
    }

    /// 저장된 청크 수
    pub async fn chunk_count(&self) -> Result<usize> {
        self.store.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::memory::MemoryVectorStore;
    use crate::knowledge::vector::VectorEntry;
    use crate::testing::KeywordEmbedding;

    async fn seeded_store(embedder: &KeywordEmbedding, texts: &[&str]) -> Arc<MemoryVectorStore> {
        let store = Arc::new(MemoryVectorStore::new());
        let mut entries = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            entries.push(VectorEntry {
                chunk_id: format!("c{}", i),
                content: text.to_string(),
                embedding: embedder.embed(text).await.unwrap(),
            });
        }
        store.insert_batch(&entries).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_retrieve_identical_text_scores_one() {
        let embedder = KeywordEmbedding::new();
        let store = seeded_store(
            &embedder,
            &["blood pressure control", "statin therapy", "dialysis planning"],
        )
        .await;
        let retriever = Retriever::new(Arc::new(embedder), store);

        let results = retriever.retrieve("statin therapy", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "statin therapy");
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[tokio::test]
    async fn test_retrieve_bounded_by_corpus() {
        let embedder = KeywordEmbedding::new();
        let store = seeded_store(&embedder, &["diet advice", "egfr decline"]).await;
        let retriever = Retriever::new(Arc::new(embedder), store);

        let results = retriever.retrieve("diet", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(retriever.chunk_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_empty_store() {
        let retriever = Retriever::new(
            Arc::new(KeywordEmbedding::new()),
            Arc::new(MemoryVectorStore::new()),
        );
        assert!(retriever.retrieve("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_dimension_mismatch() {
        let store = Arc::new(MemoryVectorStore::new());
        store
            .insert_batch(&[VectorEntry {
                chunk_id: "x".to_string(),
                content: "x".to_string(),
                embedding: vec![1.0, 0.0],
            }])
            .await
            .unwrap();
        let retriever = Retriever::new(Arc::new(KeywordEmbedding::new()), store);
        assert!(retriever.retrieve("statin", 3).await.is_err());
    }
}
