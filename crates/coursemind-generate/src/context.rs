//! Context block assembly and source listing.

use coursemind_core::{Category, ChunkType, RetrievalResult};
use coursemind_query::excerpt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters of chunk content shown with each source.
pub const EXCERPT_CHARS: usize = 500;

const SEPARATOR: &str = "\n\n---\n\n";

/// A cited source, in retrieval order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// `Source N`, as used in the context block
    pub label: String,
    pub chunk_id: Uuid,
    pub material_id: Uuid,
    pub material_title: String,
    pub page_number: u32,
    pub category: Category,
    pub chunk_type: ChunkType,
    pub is_code: bool,
    pub language: Option<String>,
    pub score: f32,
    pub excerpt: String,
}

/// Label used to cite the `index`-th result (0-based).
pub fn source_label(index: usize) -> String {
    format!("Source {}", index + 1)
}

/// Header line naming a result's origin, e.g.
/// `[Source 2: Intro to C - Page 5 - LAB - Code: c]`.
pub fn source_header(index: usize, result: &RetrievalResult) -> String {
    let meta = &result.metadata;
    let mut header = format!(
        "[{}: {} - Page {} - {}",
        source_label(index),
        meta.material_title,
        meta.page_number,
        meta.category.as_str().to_uppercase()
    );
    if meta.is_code {
        match &meta.language {
            Some(language) => header.push_str(&format!(" - Code: {language}")),
            None => header.push_str(" - Code"),
        }
    }
    if meta.chunk_type == ChunkType::Table {
        header.push_str(" - Table");
    }
    header.push(']');
    header
}

/// Concatenate results into one labelled context block.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, result)| format!("{}\n{}", source_header(i, result), result.content))
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// True when any result is code or comes from lab material.
pub fn has_lab_content(results: &[RetrievalResult]) -> bool {
    results
        .iter()
        .any(|r| r.metadata.is_code || r.metadata.category == Category::Lab)
}

/// Sources in retrieval order, labelled to match [`build_context`].
pub fn sources(results: &[RetrievalResult]) -> Vec<Source> {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| Source {
            label: source_label(i),
            chunk_id: r.chunk_id,
            material_id: r.metadata.material_id,
            material_title: r.metadata.material_title.clone(),
            page_number: r.metadata.page_number,
            category: r.metadata.category,
            chunk_type: r.metadata.chunk_type,
            is_code: r.metadata.is_code,
            language: r.metadata.language.clone(),
            score: r.score,
            excerpt: excerpt(&r.content, EXCERPT_CHARS),
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use coursemind_core::{ChunkMetadata, MaterialKind};

    pub(crate) fn result(
        title: &str,
        page: u32,
        category: Category,
        language: Option<&str>,
    ) -> RetrievalResult {
        RetrievalResult {
            chunk_id: Uuid::new_v4(),
            content: format!("[{title} - {} - Page {page}]\nbody", category.as_str().to_uppercase()),
            metadata: ChunkMetadata {
                course_id: Uuid::nil(),
                material_id: Uuid::new_v4(),
                material_title: title.to_string(),
                category,
                material_kind: MaterialKind::Pdf,
                topic: None,
                week_number: None,
                tags: vec![],
                chunk_type: if language.is_some() {
                    ChunkType::Code
                } else {
                    ChunkType::Text
                },
                chunk_order: page,
                page_number: page,
                is_code: language.is_some(),
                language: language.map(str::to_string),
                table_rows: None,
                table_columns: None,
            },
            score: 0.9,
        }
    }

    #[test]
    fn test_source_header() {
        let theory = result("Loops", 2, Category::Theory, None);
        assert_eq!(source_header(0, &theory), "[Source 1: Loops - Page 2 - THEORY]");

        let code = result("Intro to C", 5, Category::Lab, Some("c"));
        assert_eq!(
            source_header(1, &code),
            "[Source 2: Intro to C - Page 5 - LAB - Code: c]"
        );

        let mut table = result("Grades", 3, Category::Theory, None);
        table.metadata.chunk_type = ChunkType::Table;
        assert!(source_header(2, &table).ends_with(" - Table]"));
    }

    #[test]
    fn test_build_context_labels_in_order() {
        let results = vec![
            result("A", 1, Category::Theory, None),
            result("B", 2, Category::Theory, None),
        ];
        let context = build_context(&results);
        let first = context.find("[Source 1: A").unwrap();
        let second = context.find("[Source 2: B").unwrap();
        assert!(first < second);
        assert!(context.contains("\n\n---\n\n"));
    }

    #[test]
    fn test_has_lab_content() {
        assert!(!has_lab_content(&[result("A", 1, Category::Theory, None)]));
        assert!(has_lab_content(&[result("A", 1, Category::Lab, None)]));
        assert!(has_lab_content(&[result("A", 1, Category::Theory, Some("python"))]));
    }

    #[test]
    fn test_sources_excerpt() {
        let mut long = result("A", 1, Category::Theory, None);
        long.content = "x".repeat(EXCERPT_CHARS + 10);
        let sources = sources(&[long]);
        assert_eq!(sources[0].label, "Source 1");
        assert_eq!(sources[0].excerpt.chars().count(), EXCERPT_CHARS + 3);
        assert!(sources[0].excerpt.ends_with("..."));
    }
}
