//! Derived Store - `ckd_processed` 파생 테이블 저장소
//!
//! 쓰기는 항상 전체 교체(drop → create → insert, 단일 트랜잭션)입니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

use super::PatientDerived;
use crate::clinical::RiskStage;

/// 파생 테이블 이름
pub const DERIVED_TABLE: &str = "ckd_processed";

/// 환자 이력 응답 항목 (대시보드 형식)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    #[serde(rename = "eGFR")]
    pub egfr: Option<f64>,
    #[serde(rename = "uACR")]
    pub uacr: Option<f64>,
    #[serde(rename = "riskValue")]
    pub risk_value: Option<u8>,
}

/// 파생 위험도 저장소
pub struct DerivedStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl DerivedStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        })
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 파생 테이블 전체 교체
    pub fn replace_all(&self, rows: &[PatientDerived]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (
                Patient TEXT NOT NULL,
                EntryDate TEXT NOT NULL,
                eGFR REAL,
                UACR REAL,
                Risk INTEGER
             );
             CREATE INDEX idx_{table}_patient ON {table}(Patient, EntryDate);",
            table = DERIVED_TABLE
        ))
        .context("Failed to recreate derived table")?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (Patient, EntryDate, eGFR, UACR, Risk) VALUES (?1, ?2, ?3, ?4, ?5)",
                DERIVED_TABLE
            ))?;

            for row in rows {
                stmt.execute(params![
                    row.patient_id,
                    row.date.format("%Y-%m-%d").to_string(),
                    row.egfr,
                    row.uacr,
                    row.risk.map(|r| r.value()),
                ])
                .context("Failed to insert derived row")?;
            }
        }

        tx.commit().context("Failed to commit derived table")?;
        tracing::debug!("Replaced {} with {} rows", DERIVED_TABLE, rows.len());

        Ok(rows.len())
    }

    /// 파생 테이블 존재 여부
    fn has_table(conn: &Connection) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![DERIVED_TABLE],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 전체 파생 행 (환자, 날짜, 삽입 순)
    pub fn load_all(&self) -> Result<Vec<PatientDerived>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        if !Self::has_table(&conn)? {
            return Ok(vec![]);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT Patient, EntryDate, eGFR, UACR, Risk FROM {} ORDER BY rowid",
            DERIVED_TABLE
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<u8>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(patient_id, date, egfr, uacr, risk)| {
                Ok(PatientDerived {
                    patient_id,
                    date: parse_date(&date)?,
                    egfr,
                    uacr,
                    risk: risk.and_then(RiskStage::from_value),
                })
            })
            .collect()
    }

    /// 환자 한 명의 이력 (날짜 오름차순)
    pub fn patient_history(&self, patient_id: &str) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        if !Self::has_table(&conn)? {
            return Ok(vec![]);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT EntryDate, eGFR, UACR, Risk FROM {}
             WHERE Patient = ?1
             ORDER BY EntryDate, rowid",
            DERIVED_TABLE
        ))?;

        let rows = stmt
            .query_map(params![patient_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<u8>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(date, egfr, uacr, risk_value)| {
                Ok(HistoryEntry {
                    date: parse_date(&date)?,
                    egfr,
                    uacr,
                    risk_value,
                })
            })
            .collect()
    }

    /// 파생 행 개수
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        if !Self::has_table(&conn)? {
            return Ok(0);
        }

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", DERIVED_TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid EntryDate in derived table: {}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(patient: &str, day: u32, risk: Option<RiskStage>) -> PatientDerived {
        PatientDerived {
            patient_id: patient.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            egfr: Some(75.0),
            uacr: risk.map(|_| 12.0),
            risk,
        }
    }

    #[test]
    fn test_replace_all_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = DerivedStore::open(&dir.path().join("derived.db")).unwrap();

        store
            .replace_all(&[row("a", 1, None), row("a", 2, Some(RiskStage::Moderate))])
            .unwrap();
        assert_eq!(store.count().unwrap(), 2);

        store.replace_all(&[row("b", 3, Some(RiskStage::High))]).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let all = store.load_all().unwrap();
        assert_eq!(all[0].patient_id, "b");
        assert_eq!(all[0].risk, Some(RiskStage::High));
    }

    #[test]
    fn test_history_sorted_and_null_risk() {
        let dir = TempDir::new().unwrap();
        let store = DerivedStore::open(&dir.path().join("derived.db")).unwrap();

        store
            .replace_all(&[
                row("a", 9, Some(RiskStage::Low)),
                row("a", 2, None),
                row("b", 1, Some(RiskStage::VeryHigh)),
            ])
            .unwrap();

        let history = store.patient_history("a").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(history[0].risk_value, None);
        assert_eq!(history[1].risk_value, Some(1));

        let json = serde_json::to_value(&history[1]).unwrap();
        assert_eq!(json["riskValue"], 1);
        assert_eq!(json["eGFR"], 75.0);
        assert_eq!(json["date"], "2024-01-09");
    }

    #[test]
    fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = DerivedStore::open(&dir.path().join("empty.db")).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.patient_history("x").unwrap().is_empty());
        assert!(store.load_all().unwrap().is_empty());
    }
}
