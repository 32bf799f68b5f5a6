//! Plain text, notes and source code parser.

use async_trait::async_trait;
use coursemind_core::{DocumentParser, ParseError, ParsedDocument, ParsedPage};
use tracing::{debug, warn};

/// Form feed, the conventional page break in plain text exports.
const PAGE_BREAK: char = '\u{000C}';

/// Parser for text-based materials.
pub struct TextParser;

impl TextParser {
    /// Create a new text parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentParser for TextParser {
    fn name(&self) -> &str {
        "text"
    }

    fn supported_types(&self) -> &[&str] {
        &[
            "text/plain",
            "text/markdown",
            "text/x-markdown",
            "text/x-rust",
            "text/x-python",
            "text/x-java",
            "text/x-java-source",
            "text/javascript",
            "application/javascript",
            "text/typescript",
            "application/typescript",
            "text/x-go",
            "text/x-c",
            "text/x-c++",
            "text/x-csrc",
            "text/x-chdr",
            "text/x-sql",
            "application/sql",
            "application/json",
            "text/csv",
        ]
    }

    fn can_parse_extension(&self, extension: &str) -> bool {
        let extensions = [
            "txt", "md", "markdown", "rs", "py", "ipynb", "java", "js", "mjs", "ts", "tsx", "jsx",
            "go", "c", "cpp", "cc", "h", "hpp", "sql", "json", "csv", "sh", "rb", "kt", "swift",
        ];
        extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    async fn parse(&self, data: &[u8], mime_type: &str) -> Result<ParsedDocument, ParseError> {
        let text = match std::str::from_utf8(data) {
            Ok(text) => text.to_string(),
            Err(e) => {
                warn!("Text material is not valid UTF-8 ({}), decoding lossily", e);
                String::from_utf8_lossy(data).into_owned()
            }
        };

        let pages: Vec<ParsedPage> = text
            .split(PAGE_BREAK)
            .enumerate()
            .map(|(i, page)| ParsedPage::text(i as u32 + 1, page))
            .collect();

        debug!("Parsed {} text pages ({})", pages.len(), mime_type);
        Ok(ParsedDocument {
            page_count: pages.len() as u32,
            pages,
            skipped_pages: 0,
        })
    }
}
