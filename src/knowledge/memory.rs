//! In-memory Vector Store
//!
//! 프로세스 메모리에만 두는 구현입니다. 테스트와 `--in-memory` 실행에 씁니다.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::vector::{VectorEntry, VectorStore};

/// 메모리 벡터 저장소
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn reset(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        self.entries.write().await.extend_from_slice(entries);
        Ok(entries.len())
    }

    async fn scan(&self) -> Result<Vec<VectorEntry>> {
        Ok(self.entries.read().await.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryVectorStore::new();
        let entry = VectorEntry {
            chunk_id: "c1".to_string(),
            content: "text".to_string(),
            embedding: vec![1.0, 0.0],
        };

        store.insert_batch(&[entry.clone()]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.scan().await.unwrap(), vec![entry]);

        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
