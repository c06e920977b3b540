//! Lab Source - 원천 검사 DB 읽기 (읽기 전용)

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};

use super::LabRecord;
use crate::clinical::Sex;

/// 원천 SQLite DB (`labs`, `patients`)
pub struct LabSource {
    conn: Connection,
}

impl LabSource {
    /// 읽기 전용으로 열기
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Lab source database not found: {:?}", path);
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        Ok(Self { conn })
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 환자별 성별 (`patients` 테이블이 없으면 빈 맵)
    pub fn load_sexes(&self) -> Result<HashMap<String, Sex>> {
        if !self.table_exists("patients")? {
            tracing::warn!("No patients table in source; every patient uses the default sex");
            return Ok(HashMap::new());
        }

        let mut stmt = self
            .conn
            .prepare("SELECT CAST(Patient AS TEXT), CAST(Sex AS TEXT) FROM patients")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut sexes = HashMap::new();
        for row in rows {
            let (patient, sex) = row?;
            let (Some(patient), Some(sex)) = (patient, sex) else {
                continue;
            };
            match Sex::parse(&sex) {
                Some(parsed) => {
                    sexes.insert(patient, parsed);
                }
                None => tracing::debug!("Unknown sex code '{}' for patient {}", sex, patient),
            }
        }

        tracing::debug!("Loaded sex for {} patients", sexes.len());
        Ok(sexes)
    }

    /// 검사 기록 전체 로드
    ///
    /// # Returns
    /// (파싱된 기록, 날짜/환자 누락으로 건너뛴 행 수)
    pub fn load_lab_records(&self) -> Result<(Vec<LabRecord>, usize)> {
        let mut stmt = self.conn.prepare(
            "SELECT CAST(Patient AS TEXT), CAST(EntryDate AS TEXT), CAST(Analyte AS TEXT),
                    ValueNumber, CAST(ValueText AS TEXT), CAST(Unit AS TEXT)
             FROM labs",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Value>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        let mut skipped = 0;

        for row in rows {
            let (patient, date, analyte, value_number, value_text, unit) = row?;

            let (Some(patient_id), Some(date_raw)) = (patient, date) else {
                skipped += 1;
                continue;
            };

            let Some(date) = parse_entry_date(&date_raw) else {
                tracing::warn!("Skipping lab row with unparseable date '{}'", date_raw);
                skipped += 1;
                continue;
            };

            records.push(LabRecord {
                patient_id,
                date,
                analyte: analyte.unwrap_or_default(),
                value_number: numeric_value(value_number),
                value_text,
                unit,
            });
        }

        tracing::info!("Loaded {} lab records ({} skipped)", records.len(), skipped);
        Ok((records, skipped))
    }
}

/// SQLite 값 → 숫자 (TEXT에 숫자가 들어있는 경우도 허용)
fn numeric_value(value: Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(i as f64),
        Value::Real(r) if r.is_finite() => Some(r),
        Value::Text(t) => t.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// 검사 날짜 파싱 (시각은 버리고 날짜만)
pub fn parse_entry_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
}
