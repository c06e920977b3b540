//! ETL 모듈 - 검사 기록 → 환자별 CKD 위험도 테이블
//!
//! - Source: SQLite `labs` + `patients` 테이블 읽기
//! - Transform: (환자, 날짜) 정렬 후 환자별 최신값 누산기로 fold
//! - Load: `ckd_processed` 테이블 전체 교체 (재실행 시 동일 결과)

mod derived;
mod source;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clinical::{classify_risk, estimate_egfr, RiskStage, Sex};

pub use derived::{DerivedStore, HistoryEntry, DERIVED_TABLE};
pub use source::{parse_entry_date, LabSource};

// ============================================================================
// Configuration
// ============================================================================

/// ETL 설정
///
/// 나이/성별 기본값은 인구통계 데이터가 없을 때 쓰는 근사치입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// 혈청 크레아티닌 검사 이름
    pub creatinine_analyte: String,
    /// UACR 검사 이름
    pub uacr_analyte: String,
    /// UACR 원천 값에 곱하는 배율 (g/mol → mg/g)
    pub uacr_scale: f64,
    /// 나이 정보가 없을 때 가정하는 나이
    pub default_age: f64,
    /// 성별 정보가 없을 때 가정하는 성별
    pub default_sex: Sex,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            creatinine_analyte: "s_kreatinin".to_string(),
            uacr_analyte: "UACR".to_string(),
            uacr_scale: 1000.0,
            default_age: 50.0,
            default_sex: Sex::Male,
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// 원천 검사 기록 (불변)
#[derive(Debug, Clone, PartialEq)]
pub struct LabRecord {
    pub patient_id: String,
    pub date: NaiveDate,
    pub analyte: String,
    pub value_number: Option<f64>,
    pub value_text: Option<String>,
    pub unit: Option<String>,
}

/// 환자별 파생 행 (ETL 출력)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientDerived {
    pub patient_id: String,
    pub date: NaiveDate,
    pub egfr: Option<f64>,
    pub uacr: Option<f64>,
    pub risk: Option<RiskStage>,
}

/// ETL 실행 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct EtlReport {
    /// 원천에서 읽은 행 수
    pub rows_read: usize,
    /// 날짜 파싱 실패로 건너뛴 행 수
    pub rows_skipped: usize,
    /// 파생 테이블에 쓴 행 수
    pub rows_written: usize,
    /// 위험도가 정의된 행 수
    pub rows_with_risk: usize,
    /// 환자 수
    pub patients: usize,
}

// ============================================================================
// Forward-fill accumulator
// ============================================================================

/// 환자 한 명의 최신 검사값
#[derive(Debug, Clone, Copy, Default)]
struct LastKnown {
    egfr: Option<f64>,
    uacr: Option<f64>,
}

/// 환자 ID별 최신값 누산기
///
/// 정렬된 스트림을 한 번 지나가며 각 이벤트마다 파생 행을 만듭니다.
/// 값이 없는 검사 이벤트는 이전 값을 덮어쓰지 않습니다.
pub struct RiskAccumulator<'a> {
    config: &'a EtlConfig,
    sexes: &'a HashMap<String, Sex>,
    last_known: HashMap<String, LastKnown>,
}

impl<'a> RiskAccumulator<'a> {
    pub fn new(config: &'a EtlConfig, sexes: &'a HashMap<String, Sex>) -> Self {
        Self {
            config,
            sexes,
            last_known: HashMap::new(),
        }
    }

    /// 이벤트 하나 반영 후 파생 행 반환
    pub fn apply(&mut self, record: &LabRecord) -> PatientDerived {
        let sex = self
            .sexes
            .get(&record.patient_id)
            .copied()
            .unwrap_or(self.config.default_sex);

        let state = self.last_known.entry(record.patient_id.clone()).or_default();

        if record.analyte == self.config.creatinine_analyte {
            if let Some(egfr) = record
                .value_number
                .and_then(|scr| estimate_egfr(scr, sex, self.config.default_age))
            {
                state.egfr = Some(egfr);
            }
        } else if record.analyte == self.config.uacr_analyte {
            if let Some(value) = record.value_number.filter(|v| v.is_finite()) {
                state.uacr = Some(value * self.config.uacr_scale);
            }
        }

        PatientDerived {
            patient_id: record.patient_id.clone(),
            date: record.date,
            egfr: state.egfr,
            uacr: state.uacr,
            risk: classify_risk(state.egfr, state.uacr),
        }
    }

    /// 지금까지 본 환자 수
    pub fn patient_count(&self) -> usize {
        self.last_known.len()
    }
}

/// 환자 ID 정렬 키: 정수 ID는 수치 순으로 먼저, 나머지는 문자열 순
fn patient_sort_key(patient_id: &str) -> (bool, i64, &str) {
    match patient_id.trim().parse::<i64>() {
        Ok(n) => (false, n, patient_id),
        Err(_) => (true, 0, patient_id),
    }
}

/// 검사 기록 → 파생 행 (정렬 + fold)
///
/// (환자, 날짜) 오름차순 안정 정렬이므로 같은 날 이벤트는 원천 순서를 유지합니다.
pub fn derive_rows(
    mut records: Vec<LabRecord>,
    sexes: &HashMap<String, Sex>,
    config: &EtlConfig,
) -> (Vec<PatientDerived>, usize) {
    records.sort_by(|a, b| {
        patient_sort_key(&a.patient_id)
            .cmp(&patient_sort_key(&b.patient_id))
            .then_with(|| a.date.cmp(&b.date))
    });

    let mut accumulator = RiskAccumulator::new(config, sexes);
    let rows = records
        .iter()
        .map(|record| accumulator.apply(record))
        .collect();

    (rows, accumulator.patient_count())
}

// ============================================================================
// Pipeline
// ============================================================================

/// ETL 실행: source DB 읽기 → 변환 → output DB의 파생 테이블 교체
pub fn run_etl(source_path: &Path, output_path: &Path, config: &EtlConfig) -> Result<EtlReport> {
    tracing::info!("ETL started: {:?} -> {:?}", source_path, output_path);

    let source = LabSource::open(source_path).context("Failed to open lab source")?;
    let sexes = source.load_sexes().context("Failed to load patient demographics")?;
    let (records, rows_skipped) = source.load_lab_records().context("Failed to load lab records")?;
    let rows_read = records.len() + rows_skipped;

    let (rows, patients) = derive_rows(records, &sexes, config);

    let store = DerivedStore::open(output_path).context("Failed to open derived store")?;
    let rows_written = store.replace_all(&rows)?;

    let report = EtlReport {
        rows_read,
        rows_skipped,
        rows_written,
        rows_with_risk: rows.iter().filter(|r| r.risk.is_some()).count(),
        patients,
    };

    tracing::info!(
        "ETL done: {} rows written for {} patients ({} with risk, {} skipped)",
        report.rows_written,
        report.patients,
        report.rows_with_risk,
        report.rows_skipped
    );

    Ok(report)
}

// ============================================================================
// Tests
// ============================================================================
