//! CLI 모듈
//!
//! ckd-advisor CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::clinical::{assess, RiskStage, Sex};
use crate::config::AppConfig;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::etl::{run_etl, DerivedStore};
use crate::generation::{create_generator, AdviceService, RagRequest};
use crate::knowledge::{
    character_chunker, DocumentIngestor, LanceVectorStore, MemoryVectorStore, Retriever,
    VectorStore,
};
use crate::prediction::ClassifierRegistry;
use crate::server::{self, AppState};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "ckd-advisor")]
#[command(version, about = "CKD 위험도 분류 + KDIGO 가이드라인 RAG 조언", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// 모든 명령어 공통 옵션 (환경변수보다 우선)
#[derive(Args)]
pub struct GlobalArgs {
    /// 데이터 디렉토리
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Ollama 서버 URL
    #[arg(long, global = true)]
    pub ollama_url: Option<String>,

    /// 임베딩 모델
    #[arg(long, global = true)]
    pub embed_model: Option<String>,

    /// 생성 모델
    #[arg(long, global = true)]
    pub llm_model: Option<String>,
}

impl GlobalArgs {
    /// 기본값 + 환경변수 + 플래그
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::from_env();
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(url) = &self.ollama_url {
            config.embedding.base_url = url.clone();
            config.llm.base_url = url.clone();
        }
        if let Some(model) = &self.embed_model {
            config.embedding.model = model.clone();
        }
        if let Some(model) = &self.llm_model {
            config.llm.model = model.clone();
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 검사 기록 DB에서 파생 위험도 테이블 생성
    Etl {
        /// 원천 SQLite 파일 (labs, patients 테이블)
        source: PathBuf,

        /// 출력 SQLite 파일 (기본: 데이터 디렉토리의 ckd_post.db)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// UACR 배율
        #[arg(long)]
        uacr_scale: Option<f64>,

        /// 나이 정보가 없을 때 쓰는 나이
        #[arg(long)]
        default_age: Option<f64>,
    },

    /// 가이드라인 문서(PDF/텍스트)를 벡터 저장소에 수집 (기존 청크 교체)
    Ingest {
        /// 문서 경로
        file: PathBuf,

        /// 청크 크기 (문자 수)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// 청크 겹침 (문자 수)
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// 가이드라인 청크 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// 언어 모델에 질문
    Ask {
        /// 프롬프트
        prompt: String,

        /// 가이드라인 검색 결과를 컨텍스트로 사용
        #[arg(long)]
        rag: bool,

        /// eGFR (mL/min/1.73m²)
        #[arg(long)]
        egfr: Option<f64>,

        /// UACR (mg/g)
        #[arg(long)]
        uacr: Option<f64>,

        /// 위험도 (1~4)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        risk: Option<u8>,
    },

    /// 단일 검사값으로 위험도 계산
    Risk {
        /// 혈청 크레아티닌 (µmol/L)
        #[arg(short, long)]
        creatinine: Option<f64>,

        /// 성별 (F/M)
        #[arg(short, long, default_value = "M")]
        sex: Sex,

        /// 나이
        #[arg(short, long, default_value = "50")]
        age: f64,

        /// UACR (mg/g)
        #[arg(short, long)]
        uacr: Option<f64>,
    },

    /// HTTP 서버 실행
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// LanceDB 대신 메모리 저장소 사용 (--guideline과 함께)
        #[arg(long)]
        in_memory: bool,

        /// 시작 시 수집할 가이드라인 문서
        #[arg(long)]
        guideline: Option<PathBuf>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.global.config();

    match cli.command {
        Commands::Etl {
            source,
            output,
            uacr_scale,
            default_age,
        } => cmd_etl(config, source, output, uacr_scale, default_age),
        Commands::Ingest {
            file,
            chunk_size,
            chunk_overlap,
        } => cmd_ingest(config, file, chunk_size, chunk_overlap).await,
        Commands::Query { query, limit } => cmd_query(config, &query, limit).await,
        Commands::Ask {
            prompt,
            rag,
            egfr,
            uacr,
            risk,
        } => {
            let request = RagRequest {
                prompt,
                egfr,
                uacr,
                risk: risk.and_then(RiskStage::from_value),
            };
            cmd_ask(config, request, rag).await
        }
        Commands::Risk {
            creatinine,
            sex,
            age,
            uacr,
        } => cmd_risk(creatinine, sex, age, uacr),
        Commands::Serve {
            host,
            port,
            in_memory,
            guideline,
        } => cmd_serve(config, host, port, in_memory, guideline).await,
        Commands::Status => cmd_status(config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// ETL 명령어 (etl)
fn cmd_etl(
    mut config: AppConfig,
    source: PathBuf,
    output: Option<PathBuf>,
    uacr_scale: Option<f64>,
    default_age: Option<f64>,
) -> Result<()> {
    if let Some(scale) = uacr_scale {
        config.etl.uacr_scale = scale;
    }
    if let Some(age) = default_age {
        config.etl.default_age = age;
    }
    let output = output.unwrap_or_else(|| config.derived_db_path());

    println!("[*] ETL: {} -> {}", source.display(), output.display());
    let report = run_etl(&source, &output, &config.etl)?;

    println!("[OK] 읽은 행: {}", report.rows_read);
    println!("     저장한 행: {} (환자 {}명)", report.rows_written, report.patients);
    println!("     위험도 정의된 행: {}", report.rows_with_risk);
    if report.rows_skipped > 0 {
        println!("[!] 날짜 파싱 실패로 건너뛴 행: {}", report.rows_skipped);
    }
    Ok(())
}

/// 기본 임베딩 프로바이더 + LanceDB 저장소
async fn open_knowledge(
    config: &AppConfig,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn VectorStore>)> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(create_embedder(&config.embedding)?);
    let store: Arc<dyn VectorStore> = Arc::new(
        LanceVectorStore::open(&config.vector_path(), embedder.dimension())
            .await
            .context("LanceDB 열기 실패")?,
    );
    Ok((embedder, store))
}

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(
    mut config: AppConfig,
    file: PathBuf,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
) -> Result<()> {
    if !file.exists() {
        bail!("파일을 찾을 수 없습니다: {}", file.display());
    }
    if let Some(size) = chunk_size {
        config.chunking.chunk_size = size;
    }
    if let Some(overlap) = chunk_overlap {
        config.chunking.chunk_overlap = overlap;
    }

    let (embedder, store) = open_knowledge(&config).await?;
    let ingestor =
        DocumentIngestor::new(character_chunker(config.chunking.clone()), embedder, store);

    println!("[*] 수집 중: {}", file.display());
    let report = ingestor.ingest_file(&file).await?;

    println!(
        "[OK] {} 페이지 -> {} 청크 (차원 {})",
        report.pages, report.chunks, report.dimension
    );
    println!("     저장 위치: {}", config.vector_path().display());
    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(config: AppConfig, query: &str, limit: Option<usize>) -> Result<()> {
    let (embedder, store) = open_knowledge(&config).await?;
    let retriever = Retriever::new(embedder, store);
    let top_k = limit.unwrap_or(config.retrieval.top_k);

    println!("[*] 검색 중: \"{}\"", query);
    let results = retriever.retrieve(query, top_k).await?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다. 먼저 `ingest`를 실행하세요.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    for (i, result) in results.iter().enumerate() {
        println!("{}. [유사도: {:.4}] {}", i + 1, result.similarity, result.chunk_id);
        println!("   내용: {}", truncate_text(&result.content, 200));
        println!();
    }
    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(config: AppConfig, request: RagRequest, rag: bool) -> Result<()> {
    let (embedder, store) = open_knowledge(&config).await?;
    let generator = Arc::new(create_generator(&config.llm)?);
    let advisor = AdviceService::new(
        generator,
        Retriever::new(embedder, store),
        config.retrieval.top_k,
    );

    let answer = if rag {
        advisor.generate_rag(&request).await?
    } else {
        advisor.generate(&request.prompt).await?
    };

    println!("{}", answer.trim());
    Ok(())
}

/// 위험도 계산 명령어 (risk)
fn cmd_risk(creatinine: Option<f64>, sex: Sex, age: f64, uacr: Option<f64>) -> Result<()> {
    if creatinine.is_none() && uacr.is_none() {
        bail!("--creatinine 또는 --uacr 중 하나 이상이 필요합니다");
    }

    let assessment = assess(creatinine, sex, age, uacr);

    match assessment.egfr {
        Some(egfr) => println!(
            "eGFR: {:.1} mL/min/1.73m² ({})",
            egfr,
            assessment.gfr_category.map_or("-", |c| c.as_str())
        ),
        None => println!("eGFR: -"),
    }
    match assessment.uacr {
        Some(uacr) => println!(
            "UACR: {:.1} mg/g ({})",
            uacr,
            assessment.albuminuria_category.map_or("-", |c| c.as_str())
        ),
        None => println!("UACR: -"),
    }
    match assessment.risk {
        Some(risk) => println!("[OK] 위험도: {}", risk),
        None => println!("[!] 위험도: 정의되지 않음 (eGFR과 UACR이 모두 필요)"),
    }
    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    in_memory: bool,
    guideline: Option<PathBuf>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(create_embedder(&config.embedding)?);
    let store: Arc<dyn VectorStore> = if in_memory {
        Arc::new(MemoryVectorStore::new())
    } else {
        Arc::new(
            LanceVectorStore::open(&config.vector_path(), embedder.dimension())
                .await
                .context("LanceDB 열기 실패")?,
        )
    };

    if let Some(path) = guideline {
        let ingestor = DocumentIngestor::new(
            character_chunker(config.chunking.clone()),
            embedder.clone(),
            store.clone(),
        );
        let report = ingestor.ingest_file(&path).await?;
        tracing::info!("Ingested {} chunks from {:?}", report.chunks, path);
    } else if in_memory {
        tracing::warn!("In-memory store without --guideline; RAG answers will have no context");
    }

    let state = AppState::from_config(&config, embedder, Some(store)).await?;
    server::serve(&config.server, state).await
}

/// 상태 명령어 (status)
async fn cmd_status(config: AppConfig) -> Result<()> {
    println!("ckd-advisor v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[*] 임베딩: {} @ {} ({}차원)",
        config.embedding.model, config.embedding.base_url, config.embedding.dimension
    );
    println!("[*] 생성: {} @ {}", config.llm.model, config.llm.base_url);

    // 파생 위험도 테이블
    let derived_path = config.derived_db_path();
    if derived_path.exists() {
        match DerivedStore::open(&derived_path).and_then(|store| store.count()) {
            Ok(count) => println!("[OK] 파생 위험도 행: {} 건", count),
            Err(e) => println!("[!] 파생 DB 조회 실패: {}", e),
        }
    } else {
        println!("[!] 파생 DB 없음 (`etl` 실행 필요)");
    }

    // 분류기
    match ClassifierRegistry::load(&config.classifiers_file()) {
        Ok(registry) if !registry.is_empty() => {
            let types: Vec<&str> = registry.types().collect();
            println!("[OK] 분류기: {}", types.join(", "));
        }
        Ok(_) => println!("[!] 분류기 없음: {}", config.classifiers_file().display()),
        Err(e) => println!("[!] 분류기 로드 실패: {}", e),
    }

    // 벡터 저장소 (임베딩 서버 없이 열 수 있음)
    if config.vector_path().exists() {
        match LanceVectorStore::open(&config.vector_path(), config.embedding.dimension).await {
            Ok(store) => match store.count().await {
                Ok(count) => println!("[OK] 가이드라인 청크: {} 건", count),
                Err(e) => tracing::debug!("Chunk count failed: {}", e),
            },
            Err(e) => println!("[!] LanceDB 열기 실패: {}", e),
        }
    } else {
        println!("[!] 가이드라인 미수집 (`ingest` 실행 필요)");
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_truncate_unicode() {
        let text = "사구체여과율 감소";
        assert_eq!(truncate_text(text, 6), "사구체여과율...");
    }

    #[test]
    fn test_parse_risk_command() {
        let cli = Cli::try_parse_from([
            "ckd-advisor",
            "risk",
            "--creatinine",
            "70.72",
            "--sex",
            "F",
            "--age",
            "60",
            "--uacr",
            "10",
        ])
        .unwrap();

        match cli.command {
            Commands::Risk {
                creatinine,
                sex,
                age,
                uacr,
            } => {
                assert_eq!(creatinine, Some(70.72));
                assert_eq!(sex, Sex::Female);
                assert_eq!(age, 60.0);
                assert_eq!(uacr, Some(10.0));
            }
            _ => panic!("expected risk command"),
        }
    }

    #[test]
    fn test_ask_risk_range() {
        assert!(Cli::try_parse_from(["ckd-advisor", "ask", "p", "--risk", "5"]).is_err());
        assert!(Cli::try_parse_from(["ckd-advisor", "ask", "p", "--rag", "--risk", "4"]).is_ok());
    }

    #[test]
    fn test_global_flags_override_config() {
        let cli = Cli::try_parse_from([
            "ckd-advisor",
            "status",
            "--data-dir",
            "/tmp/ckd-test",
            "--ollama-url",
            "http://gpu:11434",
        ])
        .unwrap();

        let config = cli.global.config();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ckd-test"));
        assert_eq!(config.embedding.base_url, "http://gpu:11434");
        assert_eq!(config.llm.base_url, "http://gpu:11434");
    }

    #[test]
    fn test_risk_requires_a_value() {
        assert!(cmd_risk(None, Sex::Male, 50.0, None).is_err());
        assert!(cmd_risk(Some(80.0), Sex::Male, 50.0, None).is_ok());
    }
}
