//! Text Chunking Module
//!
//! 구분자로 나눈 조각을 최대 크기까지 이어 붙이고, 이전 청크의 끝부분을
//! 다음 청크 앞에 겹쳐 넣는 문자 단위 분할기입니다.
//! 크기는 바이트가 아닌 문자 수로 셉니다.

use serde::{Deserialize, Serialize};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
    /// 분할 구분자
    pub separator: String,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 100,
            separator: "\n\n".to_string(),
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// CharacterChunker
// ============================================================================

/// 구분자 기반 문자 청커
pub struct CharacterChunker {
    config: ChunkConfig,
}

impl CharacterChunker {
    /// 설정으로 생성
    ///
    /// 오버랩이 청크 크기 이상이면 청크 크기 - 1로 줄입니다.
    pub fn new(mut config: ChunkConfig) -> Self {
        if config.chunk_size == 0 {
            config.chunk_size = 1;
        }
        if config.chunk_overlap >= config.chunk_size {
            tracing::warn!(
                "Chunk overlap {} >= chunk size {}, clamping",
                config.chunk_overlap,
                config.chunk_size
            );
            config.chunk_overlap = config.chunk_size - 1;
        }
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 구분자로 분할 (빈 조각 제거)
    fn split(&self, text: &str) -> Vec<String> {
        if self.config.separator.is_empty() {
            return text.chars().map(|c| c.to_string()).collect();
        }
        text.split(self.config.separator.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// 조각들을 구분자로 이어 붙이고 trim (비면 `None`)
    fn join(&self, parts: &[String]) -> Option<String> {
        let joined = parts.join(&self.config.separator);
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// 조각 병합 (오버랩 유지)
    fn merge_splits(&self, splits: Vec<String>) -> Vec<String> {
        let separator_len = char_len(&self.config.separator);
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(&split);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + len + joiner > chunk_size {
                if total > chunk_size {
                    tracing::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total,
                        chunk_size
                    );
                }

                if !current.is_empty() {
                    if let Some(chunk) = self.join(&current) {
                        chunks.push(chunk);
                    }

                    // 오버랩 크기 이하가 되고, 새 조각이 들어갈 때까지 앞에서 제거
                    while total > overlap
                        || (total > 0
                            && total + len + if current.is_empty() { 0 } else { separator_len }
                                > chunk_size)
                    {
                        let removed = char_len(&current[0])
                            + if current.len() > 1 { separator_len } else { 0 };
                        total = total.saturating_sub(removed);
                        current.remove(0);
                    }
                }
            }

            let joiner = if current.is_empty() { 0 } else { separator_len };
            total += len + joiner;
            current.push(split);
        }

        if let Some(chunk) = self.join(&current) {
            chunks.push(chunk);
        }

        chunks
    }
}

impl Chunker for CharacterChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let splits = self.split(text);
        self.merge_splits(splits)
    }

    fn name(&self) -> &'static str {
        "CharacterChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(CharacterChunker::with_defaults())
}

/// 문자 청커 생성 (설정 지정)
pub fn character_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(CharacterChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> CharacterChunker {
        CharacterChunker::new(ChunkConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            separator: " ".to_string(),
        })
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = CharacterChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("  \n\n  ").is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunker = CharacterChunker::with_defaults();
        let chunks = chunker.chunk("KDIGO guideline.\n\nSecond paragraph.");
        assert_eq!(chunks, vec!["KDIGO guideline.\n\nSecond paragraph.".to_string()]);
    }

    #[test]
    fn test_merge_with_overlap() {
        // "foo bar baz 123", size 7, overlap 3
        let chunks = chunker(7, 3).chunk("foo bar baz 123");
        assert_eq!(chunks, vec!["foo bar", "bar baz", "baz 123"]);
    }

    #[test]
    fn test_merge_without_overlap() {
        let chunks = chunker(7, 0).chunk("aa bb cc dd");
        assert_eq!(chunks, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn test_oversized_split_kept_whole() {
        let chunks = chunker(5, 0).chunk("short verylongword end");
        assert_eq!(chunks, vec!["short", "verylongword", "end"]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = (0..200).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let chunks = chunker(50, 10).chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50);
        }
        // 연속 청크는 겹치는 단어가 있음
        let first_last = chunks[0].split(' ').last().unwrap();
        assert!(chunks[1].split(' ').any(|w| w == first_last));
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let chunks = chunker(5, 0).chunk("신장 기능 검사");
        assert_eq!(chunks, vec!["신장 기능", "검사"]);
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = CharacterChunker::new(ChunkConfig {
            chunk_size: 10,
            chunk_overlap: 20,
            separator: "\n\n".to_string(),
        });
        assert_eq!(chunker.config().chunk_overlap, 9);
    }
}
