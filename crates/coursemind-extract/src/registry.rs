//! Parser registry: routes a file to the first parser that accepts it.

use std::sync::Arc;

use coursemind_core::{DocumentParser, ParseError, ParsedDocument};
use tracing::debug;

const OCTET_STREAM: &str = "application/octet-stream";

/// Ordered list of document parsers. Earlier registrations win.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Register a parser.
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Arc::new(parser));
    }

    /// Register a shared parser.
    pub fn register_arc(&mut self, parser: Arc<dyn DocumentParser>) {
        self.parsers.push(parser);
    }

    /// Find the parser for a file, by MIME type first and extension second.
    pub fn resolve(
        &self,
        mime_type: &str,
        file_name: Option<&str>,
    ) -> Result<Arc<dyn DocumentParser>, ParseError> {
        let extension = file_name.and_then(extension_of);

        self.parsers
            .iter()
            .find(|p| p.supported_types().contains(&mime_type))
            .or_else(|| {
                self.parsers
                    .iter()
                    .find(|p| p.can_parse(mime_type, extension.as_deref()))
            })
            .cloned()
            .ok_or_else(|| {
                ParseError::UnsupportedType(match extension {
                    Some(ext) => format!("{mime_type} (.{ext})"),
                    None => mime_type.to_string(),
                })
            })
    }

    /// Reject a file before downloading it when its declared type or its
    /// URL already rules it out. A type that cannot be told yet passes, and
    /// the fetched headers decide.
    pub fn check_supported(&self, declared: Option<&str>, url: &str) -> Result<(), ParseError> {
        let mime_type = resolve_mime(declared, Some(url));
        if mime_type != OCTET_STREAM {
            self.resolve(&mime_type, Some(url))?;
        }
        Ok(())
    }

    /// Parse with whichever parser accepts the file.
    pub async fn parse(
        &self,
        data: &[u8],
        mime_type: &str,
        file_name: Option<&str>,
    ) -> Result<ParsedDocument, ParseError> {
        let parser = self.resolve(mime_type, file_name)?;
        debug!("Parsing {} with '{}' parser", mime_type, parser.name());
        parser.parse(data, mime_type).await
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the effective MIME type: a declared specific type, else a guess
/// from the file name, else `application/octet-stream`.
pub fn resolve_mime(declared: Option<&str>, file_name: Option<&str>) -> String {
    let declared = declared
        .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty() && m != OCTET_STREAM);

    declared
        .or_else(|| {
            file_name
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .map(str::to_string)
        })
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Lowercased extension of the last path segment, ignoring query strings.
fn extension_of(name: &str) -> Option<String> {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = segment.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}
