//! Document Ingestor - 원문 → 청크 → 임베딩 → 벡터 저장소
//!
//! 수집은 항상 기존 청크를 모두 지운 뒤 다시 넣습니다 (병합 없음).

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::extractor::{load_document, SourcePage};

use super::chunker::Chunker;
use super::vector::{VectorEntry, VectorStore};

/// 수집 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks: usize,
    pub dimension: usize,
}

/// 문서 수집기
pub struct DocumentIngestor {
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl DocumentIngestor {
    pub fn new(
        chunker: Box<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// 파일 수집 (PDF / 텍스트)
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let pages = load_document(path)
            .await
            .with_context(|| format!("Failed to load document {:?}", path))?;

        if pages.is_empty() {
            tracing::warn!("No text found in {:?}", path);
        }

        self.ingest_pages(&pages).await
    }

    /// 페이지 목록 수집
    ///
    /// 페이지마다 따로 청킹하므로 청크가 페이지 경계를 넘지 않습니다.
    pub async fn ingest_pages(&self, pages: &[SourcePage]) -> Result<IngestReport> {
        let chunks: Vec<String> = pages
            .iter()
            .flat_map(|page| self.chunker.chunk(&page.text))
            .collect();

        tracing::info!(
            "Chunked {} pages into {} chunks ({})",
            pages.len(),
            chunks.len(),
            self.chunker.name()
        );

        let embeddings = self
            .embedder
            .embed_batch(&chunks)
            .await
            .context("Failed to embed chunks")?;

        if embeddings.len() != chunks.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }

        let dimension = self.embedder.dimension();
        let entries: Vec<VectorEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(content, embedding)| VectorEntry {
                chunk_id: Uuid::new_v4().to_string(),
                content,
                embedding,
            })
            .collect();

        // 임베딩이 모두 끝난 뒤에 초기화 (중간 실패 시 기존 청크 유지)
        self.store.reset().await.context("Failed to reset vector store")?;
        let inserted = self
            .store
            .insert_batch(&entries)
            .await
            .context("Failed to insert chunks")?;

        tracing::info!(
            "Stored {} chunks with {} embeddings (dimension {})",
            inserted,
            self.embedder.name(),
            dimension
        );

        Ok(IngestReport {
            pages: pages.len(),
            chunks: inserted,
            dimension,
        })
    }
}
