//! Inline filter syntax for command-line queries.

use coursemind_core::{Category, ChunkType, Error, Result, RetrievalFilter};
use uuid::Uuid;

/// Parsed query with text and filters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// Main query text
    pub text: String,
    /// Extracted filters, scoped to one course
    pub filter: RetrievalFilter,
    /// Result limit, if given
    pub limit: Option<usize>,
}

/// Query parser for the inline filter syntax.
#[derive(Debug, Default)]
pub struct QueryParser;

impl QueryParser {
    /// Create a new query parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse a query string for one course.
    ///
    /// Supports filters like:
    /// - `category:lab` or `category:theory`
    /// - `week:3`
    /// - `material:<uuid>`
    /// - `lang:python` (implies `code:true`)
    /// - `type:table`, `code:true`
    /// - `limit:10`
    ///
    /// Unknown keys are kept as query text. A known key with a bad value is
    /// rejected.
    pub fn parse(&self, course_id: Uuid, query: &str) -> Result<ParsedQuery> {
        let mut text_parts = Vec::new();
        let mut filter = RetrievalFilter::course(course_id);
        let mut limit = None;

        for part in query.split_whitespace() {
            let Some((key, value)) = part.split_once(':') else {
                text_parts.push(part);
                continue;
            };

            match key.to_lowercase().as_str() {
                "category" | "cat" => filter.category = Some(value.parse::<Category>()?),
                "week" => filter.week_number = Some(parse_number(key, value)?),
                "material" => {
                    let id = Uuid::parse_str(value)
                        .map_err(|e| Error::Validation(format!("invalid material id: {e}")))?;
                    filter.material_id = Some(id);
                }
                "lang" | "language" => {
                    filter.language = Some(value.to_lowercase());
                    filter.is_code = Some(true);
                }
                "type" => filter.chunk_type = Some(value.parse::<ChunkType>()?),
                "code" => {
                    let is_code = value.parse::<bool>().map_err(|_| {
                        Error::Validation(format!("code: expects true or false, got '{value}'"))
                    })?;
                    filter.is_code = Some(is_code);
                }
                "limit" => limit = Some(parse_number(key, value)? as usize),
                _ => text_parts.push(part),
            }
        }

        Ok(ParsedQuery {
            text: text_parts.join(" "),
            filter,
            limit,
        })
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("{key}: expects a number, got '{value}'")))
}
