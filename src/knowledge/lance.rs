//! LanceDB Vector Store - 가이드라인 청크 저장소
//!
//! 청크/임베딩을 Arrow 컬럼으로 저장합니다. 검색은 LanceDB ANN이 아니라
//! 전체 스캔 후 정확한 코사인 유사도로 수행하므로, 삽입 순서를 `seq` 컬럼에 남깁니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::vector::{VectorEntry, VectorStore};

/// 청크 테이블 이름
const TABLE_NAME: &str = "guideline_chunks";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    dimension: i32,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원 (테이블 스키마에 고정)
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db, dimension })
    }

    /// 청크 테이블 스키마 생성
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("seq", DataType::Int64, false),
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry], first_seq: i64) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != self.dimension as usize)
        {
            anyhow::bail!(
                "Embedding dimension mismatch: chunk {} has {}, table expects {}",
                bad.chunk_id,
                bad.embedding.len(),
                self.dimension
            );
        }

        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.iter().any(|v| !v.is_finite()))
        {
            anyhow::bail!("Embedding for chunk {} contains non-finite values", bad.chunk_id);
        }

        let seqs: Vec<i64> = (0..entries.len() as i64).map(|i| first_seq + i).collect();
        let chunk_ids: Vec<&str> = entries.iter().map(|e| e.chunk_id.as_str()).collect();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(Int64Array::from(seqs)),
                Arc::new(StringArray::from(chunk_ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// RecordBatch → (seq, 엔트리)
    fn batch_to_entries(batch: &RecordBatch) -> Result<Vec<(i64, VectorEntry)>> {
        let seqs = batch
            .column_by_name("seq")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing seq column"))?;

        let chunk_ids = batch
            .column_by_name("chunk_id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing chunk_id column"))?;

        let contents = batch
            .column_by_name("content")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing content column"))?;

        let embeddings = batch
            .column_by_name("embedding")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing embedding column"))?;

        let mut entries = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let vector = embeddings.value(i);
            let vector = vector
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| anyhow::anyhow!("Embedding items are not f32"))?;

            entries.push((
                seqs.value(i),
                VectorEntry {
                    chunk_id: chunk_ids.value(i).to_string(),
                    content: contents.value(i).to_string(),
                    embedding: vector.values().to_vec(),
                },
            ));
        }

        Ok(entries)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open chunk table")
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn reset(&self) -> Result<()> {
        if self.table_exists().await {
            self.db
                .drop_table(TABLE_NAME)
                .await
                .context("Failed to drop chunk table")?;
            tracing::info!("Dropped existing chunk table");
        }
        Ok(())
    }

    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let first_seq = self.count().await? as i64;
        let batch = self.entries_to_batch(entries, first_seq)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            // 기존 테이블에 추가
            let table = self.open_table().await?;
            table
                .add(batches)
                .execute()
                .await
                .context("Failed to add chunks to table")?;
        } else {
            // 새 테이블 생성
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(entries.len())
    }

    async fn scan(&self) -> Result<Vec<VectorEntry>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;
        let total = table.count_rows(None).await.context("Failed to count rows")?;
        if total == 0 {
            return Ok(vec![]);
        }

        let stream = table
            .query()
            .limit(total)
            .execute()
            .await
            .context("Failed to scan chunk table")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut rows = Vec::with_capacity(total);
        for batch in &batches {
            rows.extend(Self::batch_to_entries(batch)?);
        }

        // 삽입 순서 복원
        rows.sort_by_key(|(seq, _)| *seq);

        Ok(rows.into_iter().map(|(_, entry)| entry).collect())
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }
}

// ============================================================================
// Tests
// ============================================================================
