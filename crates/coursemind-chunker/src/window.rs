//! Fixed-size sliding window chunking, one page at a time.

use async_trait::async_trait;
use chrono::Utc;
use coursemind_core::{
    Chunk, ChunkConfig, ChunkError, ChunkType, Chunker, Material, MaterialSnapshot, ParsedPage,
};
use tracing::debug;
use uuid::Uuid;

use crate::classify::classify_chunk;
use crate::header::context_header;
use crate::table::{is_empty_table, render_table, table_shape};

/// A window over a page's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    /// Offset of the first character, in characters
    pub start: usize,
    pub text: String,
}

/// Split `text` into windows of `chunk_size` characters advancing by
/// `chunk_size - overlap`. The last window may be shorter; it is always kept.
pub fn sliding_windows(text: &str, config: &ChunkConfig) -> Vec<TextWindow> {
    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();
    let step = config.step().max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    while start < total_chars {
        let end = (start + config.chunk_size).min(total_chars);
        windows.push(TextWindow {
            start,
            text: chars[start..end].iter().collect(),
        });
        if end >= total_chars {
            break;
        }
        start += step;
    }

    windows
}

/// Sliding window chunker with separate table chunks.
pub struct SlidingWindowChunker {
    config: ChunkConfig,
}

impl SlidingWindowChunker {
    /// Create a chunker, rejecting unusable window parameters.
    pub fn new(config: ChunkConfig) -> Result<Self, ChunkError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    fn build_chunk(
        material: &MaterialSnapshot,
        chunk_order: u32,
        page_number: u32,
        text: String,
    ) -> Chunk {
        let classification = classify_chunk(&text);
        Chunk {
            id: Uuid::new_v4(),
            material_id: material.material_id,
            course_id: material.course_id,
            chunk_order,
            chunk_type: if classification.is_code {
                ChunkType::Code
            } else {
                ChunkType::Text
            },
            page_number,
            header: context_header(material, page_number),
            text,
            is_code: classification.is_code,
            language: classification.language,
            table: None,
            material: material.clone(),
            created_at: Utc::now(),
        }
    }
}

impl Default for SlidingWindowChunker {
    fn default() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }
}

#[async_trait]
impl Chunker for SlidingWindowChunker {
    fn name(&self) -> &str {
        "sliding_window"
    }

    async fn chunk(
        &self,
        pages: &[ParsedPage],
        material: &Material,
    ) -> Result<Vec<Chunk>, ChunkError> {
        let snapshot = material.snapshot();
        let mut chunks = Vec::new();
        let mut chunk_order = 0u32;

        for page in pages {
            for window in sliding_windows(&page.text, &self.config) {
                if window.text.trim().is_empty() {
                    continue;
                }
                chunks.push(Self::build_chunk(
                    &snapshot,
                    chunk_order,
                    page.page_number,
                    window.text,
                ));
                chunk_order += 1;
            }

            for table in page.tables.iter().filter(|t| !is_empty_table(t)) {
                let mut chunk = Self::build_chunk(
                    &snapshot,
                    chunk_order,
                    page.page_number,
                    render_table(table)?,
                );
                chunk.chunk_type = ChunkType::Table;
                chunk.is_code = false;
                chunk.language = None;
                chunk.table = Some(table_shape(table));
                chunks.push(chunk);
                chunk_order += 1;
            }
        }

        debug!(
            "Chunked {} pages of material {} into {} chunks",
            pages.len(),
            material.id,
            chunks.len()
        );
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursemind_core::{Category, ParsedTable};

    fn create_test_material() -> Material {
        Material::new(Uuid::new_v4(), "Control Flow", Category::Theory)
    }

    fn config(chunk_size: usize, overlap_fraction: f64) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            overlap_fraction,
        }
    }

    fn pseudo_text(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i * 7 % 26) as u8))
            .collect()
    }

    /// Rebuild page text from windows using their start offsets.
    fn reconstruct(windows: &[TextWindow]) -> String {
        let mut out: Vec<char> = Vec::new();
        for window in windows {
            let chars: Vec<char> = window.text.chars().collect();
            let skip = out.len().saturating_sub(window.start);
            out.extend(chars.into_iter().skip(skip));
        }
        out.into_iter().collect()
    }

    // ==================== Window Tests ====================

    #[test]
    fn test_windows_empty_text() {
        assert!(sliding_windows("", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn test_windows_short_text_single_window() {
        let windows = sliding_windows("short page", &ChunkConfig::default());
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].text, "short page");
    }

    #[test]
    fn test_windows_exact_size_single_window() {
        let text = pseudo_text(800);
        let windows = sliding_windows(&text, &ChunkConfig::default());
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn test_windows_cover_text() {
        let text = pseudo_text(2_345);
        let windows = sliding_windows(&text, &ChunkConfig::default());
        assert_eq!(reconstruct(&windows), text);
    }

    #[test]
    fn test_windows_overlap_exact() {
        let text = pseudo_text(3_000);
        let cfg = config(800, 0.25);
        let windows = sliding_windows(&text, &cfg);
        let overlap = cfg.overlap();
        assert_eq!(overlap, 200);

        for pair in windows.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next: Vec<char> = pair[1].text.chars().collect();
            assert_eq!(pair[1].start - pair[0].start, 600);
            assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
        }
    }

    #[test]
    fn test_windows_keep_final_partial() {
        let text = pseudo_text(1_000);
        let windows = sliding_windows(&text, &ChunkConfig::default());
        // starts at 0 and 640; the second window holds the last 360 chars
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].start, 640);
        assert_eq!(windows[1].text.chars().count(), 360);
    }

    #[test]
    fn test_windows_count_characters_not_bytes() {
        let text = "é".repeat(1_000);
        let windows = sliding_windows(&text, &ChunkConfig::default());
        assert_eq!(windows[0].text.chars().count(), 800);
        assert_eq!(reconstruct(&windows), text);
    }

    #[test]
    fn test_zero_overlap() {
        let text = pseudo_text(1_600);
        let windows = sliding_windows(&text, &config(800, 0.0));
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].start, 800);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(SlidingWindowChunker::new(config(0, 0.2)).is_err());
        assert!(SlidingWindowChunker::new(config(800, 1.5)).is_err());
    }

    // ==================== Chunker Tests ====================

    #[tokio::test]
    async fn test_chunks_never_span_pages() {
        let chunker = SlidingWindowChunker::default();
        let material = create_test_material();
        let pages = vec![
            ParsedPage::text(1, pseudo_text(500)),
            ParsedPage::text(2, pseudo_text(500)),
        ];

        let chunks = chunker.chunk(&pages, &material).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_number, 1);
        assert_eq!(chunks[1].page_number, 2);
        assert_eq!(chunks[0].text.chars().count(), 500);
    }

    #[tokio::test]
    async fn test_chunk_order_spans_pages_and_tables() {
        let chunker = SlidingWindowChunker::default();
        let material = create_test_material();
        let mut page2 = ParsedPage::text(2, pseudo_text(1_000));
        page2.tables.push(ParsedTable {
            rows: vec![
                vec!["a".into(), "b".into(), "c".into()],
                vec!["1".into(), "2".into(), "3".into()],
            ],
            bbox: None,
        });
        let pages = vec![
            ParsedPage::text(1, pseudo_text(100)),
            page2,
            ParsedPage::text(3, pseudo_text(100)),
        ];

        let chunks = chunker.chunk(&pages, &material).await.unwrap();

        let orders: Vec<u32> = chunks.iter().map(|c| c.chunk_order).collect();
        assert_eq!(orders, (0..chunks.len() as u32).collect::<Vec<_>>());

        let tables: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkType::Table)
            .collect();
        assert_eq!(tables.len(), 1);
        let shape = tables[0].table.unwrap();
        assert_eq!((shape.rows, shape.columns), (2, 3));
        assert_eq!(tables[0].page_number, 2);
        assert!(tables[0].text.starts_with("{\"rows\""));

        let non_table = chunks.len() - tables.len();
        assert!(non_table >= 3);
    }

    #[tokio::test]
    async fn test_chunk_header_and_metadata() {
        let chunker = SlidingWindowChunker::default();
        let mut material = create_test_material();
        material.category = Category::Lab;
        material.week_number = Some(4);
        material.tags = vec!["loops".into()];

        let pages = vec![ParsedPage::text(5, "Some theory about loops.")];
        let chunks = chunker.chunk(&pages, &material).await.unwrap();

        let chunk = &chunks[0];
        assert_eq!(chunk.header, "[Control Flow - LAB - Page 5]");
        assert!(chunk.content().starts_with("[Control Flow - LAB - Page 5]\n"));
        assert!(chunk.content().ends_with("Some theory about loops."));

        let meta = chunk.metadata();
        assert_eq!(meta.material_id, material.id);
        assert_eq!(meta.course_id, material.course_id);
        assert_eq!(meta.week_number, Some(4));
        assert_eq!(meta.tags, vec!["loops".to_string()]);
    }

    #[tokio::test]
    async fn test_code_window_classified() {
        let chunker = SlidingWindowChunker::default();
        let material = create_test_material();
        let pages = vec![ParsedPage::text(
            5,
            "int total = 0;\nfor (int i = 0; i < n; i++) {\n  total += i;\n}",
        )];

        let chunks = chunker.chunk(&pages, &material).await.unwrap();

        assert!(chunks[0].is_code);
        assert_eq!(chunks[0].chunk_type, ChunkType::Code);
        assert!(chunks[0].language.is_some());
    }

    #[tokio::test]
    async fn test_blank_pages_produce_no_chunks() {
        let chunker = SlidingWindowChunker::default();
        let material = create_test_material();
        let pages = vec![ParsedPage::text(1, "   \n\n  "), ParsedPage::text(2, "")];

        let chunks = chunker.chunk(&pages, &material).await.unwrap();

        assert!(chunks.is_empty());
    }
}
