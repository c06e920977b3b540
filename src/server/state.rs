//! 서버 공유 상태
//!
//! 모델 클라이언트·저장소·분류기를 시작 시 한 번 만들고
//! 핸들러에는 `State<AppState>`로 전달합니다 (전역 싱글턴 없음).

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::embedding::EmbeddingProvider;
use crate::etl::DerivedStore;
use crate::generation::{create_generator, AdviceService};
use crate::knowledge::{LanceVectorStore, Retriever, VectorStore};
use crate::prediction::ClassifierRegistry;

/// 공유 애플리케이션 상태
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    advisor: AdviceService,
    classifiers: ClassifierRegistry,
    derived: Option<DerivedStore>,
}

impl AppState {
    /// 구성 요소로 직접 생성
    pub fn new(
        advisor: AdviceService,
        classifiers: ClassifierRegistry,
        derived: Option<DerivedStore>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                advisor,
                classifiers,
                derived,
            }),
        }
    }

    /// 설정으로 생성
    ///
    /// `store`가 없으면 설정의 LanceDB 경로를 엽니다.
    /// 파생 DB 파일이 없으면 이력 조회는 비활성화됩니다.
    pub async fn from_config(
        config: &AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Option<Arc<dyn VectorStore>>,
    ) -> Result<Self> {
        tracing::info!("Initializing application state...");

        let store: Arc<dyn VectorStore> = match store {
            Some(store) => store,
            None => Arc::new(
                LanceVectorStore::open(&config.vector_path(), embedder.dimension())
                    .await
                    .context("Failed to open guideline store")?,
            ),
        };

        let generator = Arc::new(create_generator(&config.llm)?);
        let advisor = AdviceService::new(
            generator,
            Retriever::new(embedder, store),
            config.retrieval.top_k,
        );

        let classifiers = ClassifierRegistry::load(&config.classifiers_file())?;

        let derived_path = config.derived_db_path();
        let derived = if derived_path.exists() {
            Some(DerivedStore::open(&derived_path)?)
        } else {
            tracing::warn!(
                "Derived database {:?} not found; patient history is disabled until `etl` runs",
                derived_path
            );
            None
        };

        Ok(Self::new(advisor, classifiers, derived))
    }

    pub fn advisor(&self) -> &AdviceService {
        &self.inner.advisor
    }

    pub fn classifiers(&self) -> &ClassifierRegistry {
        &self.inner.classifiers
    }

    pub fn derived(&self) -> Option<&DerivedStore> {
        self.inner.derived.as_ref()
    }
}
