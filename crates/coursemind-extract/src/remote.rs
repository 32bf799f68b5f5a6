//! Client for an external document parsing service.
//!
//! The service accepts a multipart upload and returns per-page JSON with
//! text, markdown, tables and images. OCR is requested for the configured
//! languages so scanned slides still yield text. Pages the service marks as
//! failed are skipped and counted.

use std::time::Duration;

use async_trait::async_trait;
use coursemind_core::{
    BoundingBox, DocumentParser, Error, ParseError, ParsedDocument, ParsedImage, ParsedPage, ParsedTable,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

/// Connection settings for the parsing service.
#[derive(Debug, Clone)]
pub struct RemoteParserConfig {
    /// Service base URL
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    /// OCR languages, e.g. `["en"]`
    pub ocr_languages: Vec<String>,
    /// Request timeout
    pub timeout: Duration,
}

/// Parser backed by a remote parsing service.
pub struct RemoteParser {
    client: reqwest::Client,
    config: RemoteParserConfig,
}

impl RemoteParser {
    /// Create a client. Fails when the endpoint or key is missing.
    pub fn new(config: RemoteParserConfig) -> Result<Self, Error> {
        if config.base_url.trim().is_empty() {
            return Err(Error::Config(
                "parsing service URL is not configured".to_string(),
            ));
        }
        if config.api_key.trim().is_empty() {
            return Err(Error::Config(
                "parsing service API key is not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/parse", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl DocumentParser for RemoteParser {
    fn name(&self) -> &str {
        "remote"
    }

    fn supported_types(&self) -> &[&str] {
        &[
            "application/pdf",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.ms-powerpoint",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/msword",
        ]
    }

    fn can_parse_extension(&self, extension: &str) -> bool {
        ["pdf", "pptx", "ppt", "docx", "doc"]
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    async fn parse(&self, data: &[u8], mime_type: &str) -> Result<ParsedDocument, ParseError> {
        let file = Part::bytes(data.to_vec())
            .file_name("upload")
            .mime_str(mime_type)
            .map_err(|e| ParseError::Remote(format!("invalid MIME type: {e}")))?;
        let form = Form::new()
            .part("file", file)
            .text("ocr", "true")
            .text("ocr_languages", self.config.ocr_languages.join(","))
            .text("extract_tables", "true")
            .text("extract_images", "true");

        debug!(
            "Sending {} bytes to parsing service ({})",
            data.len(),
            mime_type
        );
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key.trim())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ParseError::Remote(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            if status == reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE {
                return Err(ParseError::UnsupportedType(mime_type.to_string()));
            }
            return Err(ParseError::Remote(format!("service returned {status}: {body}")));
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| ParseError::Remote(format!("malformed response: {e}")))?;

        into_document(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    pages: Vec<ResponsePage>,
}

#[derive(Debug, Deserialize)]
struct ResponsePage {
    page: u32,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    md: Option<String>,
    #[serde(default)]
    tables: Vec<ResponseTable>,
    #[serde(default)]
    images: Vec<ResponseImage>,
}

#[derive(Debug, Deserialize)]
struct ResponseTable {
    rows: Vec<Vec<String>>,
    #[serde(default)]
    bbox: Option<BoundingBox>,
}

#[derive(Debug, Deserialize)]
struct ResponseImage {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    bbox: Option<BoundingBox>,
    #[serde(default, rename = "type")]
    mime_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

fn into_document(response: ParseResponse) -> Result<ParsedDocument, ParseError> {
    let page_count = response.pages.len() as u32;
    let mut skipped_pages = 0u32;
    let mut pages = Vec::with_capacity(response.pages.len());

    for page in response.pages {
        let failed = page.status.as_deref().is_some_and(|s| s != "ok");
        let Some(text) = page.text.filter(|_| !failed) else {
            warn!(
                "Parsing service skipped page {}: {}",
                page.page,
                page.error.as_deref().unwrap_or("no text returned")
            );
            skipped_pages += 1;
            continue;
        };

        pages.push(ParsedPage {
            page_number: page.page,
            text,
            markdown: page.md,
            tables: page
                .tables
                .into_iter()
                .map(|t| ParsedTable {
                    rows: t.rows,
                    bbox: t.bbox,
                })
                .collect(),
            images: page
                .images
                .into_iter()
                .map(|i| ParsedImage {
                    bbox: i.bbox,
                    uri: i.url,
                    mime_type: i.mime_type,
                    width: i.width,
                    height: i.height,
                })
                .collect(),
        });
    }

    if page_count > 0 && pages.is_empty() {
        return Err(ParseError::Failed(format!(
            "none of the {page_count} pages could be parsed"
        )));
    }

    pages.sort_by_key(|p| p.page_number);
    Ok(ParsedDocument {
        pages,
        skipped_pages,
        page_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteParserConfig {
        RemoteParserConfig {
            base_url: "https://parser.example.com/v1/".to_string(),
            api_key: "secret".to_string(),
            ocr_languages: vec!["en".to_string()],
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_requires_api_key() {
        let mut cfg = config();
        cfg.api_key = "  ".to_string();
        assert!(RemoteParser::new(cfg).is_err());
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let parser = RemoteParser::new(config()).unwrap();
        assert_eq!(parser.endpoint(), "https://parser.example.com/v1/parse");
    }

    #[test]
    fn test_into_document_with_table_and_skipped_page() {
        let json = r##"{
            "pages": [
                {"page": 1, "status": "ok", "text": "Intro", "md": "# Intro"},
                {"page": 2, "status": "ok", "text": "Results",
                 "tables": [{"rows": [["a","b","c"],["1","2","3"]],
                             "bbox": {"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}}],
                 "images": [{"url": "https://cdn.example.com/p2.png", "type": "image/png"}]},
                {"page": 3, "status": "error", "error": "ocr timeout"}
            ]
        }"##;
        let response: ParseResponse = serde_json::from_str(json).unwrap();
        let doc = into_document(response).unwrap();

        assert_eq!(doc.page_count, 3);
        assert_eq!(doc.skipped_pages, 1);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].markdown.as_deref(), Some("# Intro"));
        assert_eq!(doc.pages[1].tables[0].column_count(), 3);
        assert_eq!(
            doc.pages[1].images[0].uri.as_deref(),
            Some("https://cdn.example.com/p2.png")
        );
    }

    #[test]
    fn test_into_document_all_pages_failed() {
        let json = r#"{"pages": [{"page": 1, "status": "error"}]}"#;
        let response: ParseResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            into_document(response),
            Err(ParseError::Failed(_))
        ));
    }

    #[test]
    fn test_missing_text_counts_as_skipped() {
        let json = r#"{"pages": [{"page": 1, "text": "ok"}, {"page": 2}]}"#;
        let response: ParseResponse = serde_json::from_str(json).unwrap();
        let doc = into_document(response).unwrap();
        assert_eq!(doc.skipped_pages, 1);
    }
}
