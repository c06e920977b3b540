//! RAG 프롬프트 템플릿
//!
//! 같은 입력에는 항상 같은 프롬프트가 나와야 합니다 (결정적 템플릿).

use serde::{Deserialize, Serialize};

use crate::clinical::RiskStage;
use crate::knowledge::SearchResult;

const INSTRUCTIONS: &str = "\
You will have to give an advice about CKD based on context taken from the KDIGO guidelines.
You have to return the advice and only the advice, sourced from the context (full title: Kidney Disease: Improving Global Outcomes (KDIGO) 2024 Clinical Practice Guideline for the Evaluation and Management of Chronic Kidney Disease).
You have to rely only on the context given.
You may have as additional information the eGFR, the UACR and a risk between 1 and 4.
You have to be concise and clear and speak in the third person (e.g. The patient should take this...)";

/// 구조화된 환자 정보 (모두 선택)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub egfr: Option<f64>,
    pub uacr: Option<f64>,
    pub risk: Option<RiskStage>,
}

impl PatientInfo {
    pub fn is_empty(&self) -> bool {
        self.egfr.is_none() && self.uacr.is_none() && self.risk.is_none()
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(egfr) = self.egfr {
            lines.push(format!("eGFR: {:.1} mL/min/1.73m2", egfr));
        }
        if let Some(uacr) = self.uacr {
            lines.push(format!("UACR: {:.1} mg/g", uacr));
        }
        if let Some(risk) = self.risk {
            lines.push(format!("Risk: {} ({})", risk.value(), risk.label()));
        }
        lines
    }
}

/// 검색된 청크를 `## Chunk i` 블록으로 직렬화
fn format_context(chunks: &[SearchResult]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("## Chunk {}\n{}", i + 1, chunk.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// RAG 프롬프트 생성
pub fn build_rag_prompt(prompt: &str, patient: &PatientInfo, chunks: &[SearchResult]) -> String {
    let mut patient_block = prompt.trim().to_string();
    for line in patient.lines() {
        patient_block.push('\n');
        patient_block.push_str(&line);
    }

    format!(
        "{}\n\n# Context\n{}\n\n# Patient information\n{}\n",
        INSTRUCTIONS,
        format_context(chunks),
        patient_block
    )
}
