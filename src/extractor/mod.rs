//! 콘텐츠 추출 모듈
//!
//! 가이드라인 원문 파일에서 페이지 단위 텍스트를 추출합니다.
//! - PDF 파일: pdf-extract로 텍스트 추출 후 페이지 분리
//! - 텍스트 파일 (.txt, .md): 전체를 한 페이지로

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

// ============================================================================
// Source Document
// ============================================================================

/// 원문 파일 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Text,
}

impl SourceKind {
    /// 확장자로 형식 판별
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceKind::Pdf),
            "txt" | "md" | "markdown" => Some(SourceKind::Text),
            _ => None,
        }
    }
}

/// 추출된 페이지
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePage {
    /// 페이지 번호 (1부터 시작)
    pub number: usize,
    pub text: String,
}

/// 파일에서 페이지 목록 추출
pub async fn load_document(path: &Path) -> Result<Vec<SourcePage>> {
    let kind = SourceKind::from_path(path)
        .ok_or_else(|| anyhow::anyhow!("Unsupported document type: {:?}", path))?;

    let pages = match kind {
        SourceKind::Pdf => {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
                .await
                .context("PDF extraction task failed")??
        }
        SourceKind::Text => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read text file: {:?}", path))?;
            vec![(1, text)]
        }
    };

    tracing::debug!("Extracted {} pages from {:?}", pages.len(), path);

    Ok(pages
        .into_iter()
        .map(|(number, text)| SourcePage { number, text })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_kind() {
        assert_eq!(SourceKind::from_path(Path::new("doc.PDF")), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::from_path(Path::new("notes.md")), Some(SourceKind::Text));
        assert_eq!(SourceKind::from_path(Path::new("image.png")), None);
        assert_eq!(SourceKind::from_path(Path::new("noext")), None);
    }

    #[tokio::test]
    async fn test_load_text_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guideline.txt");
        std::fs::write(&path, "Recommendation 1.1\n\nRecommendation 1.2").unwrap();

        let pages = load_document(&path).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("Recommendation 1.2"));
    }

    #[tokio::test]
    async fn test_load_unsupported() {
        assert!(load_document(Path::new("scan.png")).await.is_err());
    }
}
