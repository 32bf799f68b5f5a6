//! Local PDF parser.
//!
//! Uses lopdf to pull text page by page so that one unreadable page does not
//! sink the whole document. Embedded images are recorded as metadata only.
//! Scanned documents need OCR and should go to the
//! [`RemoteParser`](crate::RemoteParser) instead.

use async_trait::async_trait;
use coursemind_core::{DocumentParser, ParseError, ParsedDocument, ParsedImage, ParsedPage};
use lopdf::Document;
use tracing::{debug, warn};

/// Configuration for image metadata limits.
const MAX_IMAGES_PER_PAGE: usize = 20;
const MIN_DIMENSION: i64 = 50; // Skip tiny images (icons, bullets)

/// Parser for PDF files.
pub struct PdfParser;

impl PdfParser {
    /// Create a new PDF parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentParser for PdfParser {
    fn name(&self) -> &str {
        "pdf"
    }

    fn supported_types(&self) -> &[&str] {
        &["application/pdf"]
    }

    fn can_parse_extension(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("pdf")
    }

    async fn parse(&self, data: &[u8], _mime_type: &str) -> Result<ParsedDocument, ParseError> {
        let bytes = data.to_vec();
        tokio::task::spawn_blocking(move || parse_pdf(&bytes))
            .await
            .map_err(|e| ParseError::Failed(format!("Task join error: {e}")))?
    }
}

/// Parse every page, skipping and counting the ones that fail.
fn parse_pdf(bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| ParseError::Failed(format!("not a readable PDF: {e}")))?;

    if doc.is_encrypted() {
        return Err(ParseError::Failed("PDF is encrypted".to_string()));
    }

    let page_ids = doc.get_pages();
    let page_count = page_ids.len() as u32;
    let mut pages = Vec::with_capacity(page_ids.len());
    let mut skipped_pages = 0u32;

    for (page_number, page_id) in page_ids {
        let text = match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping PDF page {}: {}", page_number, e);
                skipped_pages += 1;
                continue;
            }
        };

        pages.push(ParsedPage {
            page_number,
            text,
            markdown: None,
            tables: Vec::new(),
            images: page_images(&doc, page_id, page_number),
        });
    }

    if page_count > 0 && pages.is_empty() {
        return Err(ParseError::Failed(format!(
            "none of the {page_count} pages could be parsed"
        )));
    }

    debug!(
        "Parsed PDF: {} pages, {} skipped",
        pages.len(),
        skipped_pages
    );
    Ok(ParsedDocument {
        pages,
        skipped_pages,
        page_count,
    })
}

fn page_images(doc: &Document, page_id: lopdf::ObjectId, page_number: u32) -> Vec<ParsedImage> {
    let images = match doc.get_page_images(page_id) {
        Ok(images) => images,
        Err(e) => {
            debug!("Failed to get images from page {}: {}", page_number, e);
            return Vec::new();
        }
    };

    images
        .iter()
        .filter(|img| img.width >= MIN_DIMENSION && img.height >= MIN_DIMENSION)
        .take(MAX_IMAGES_PER_PAGE)
        .map(|img| ParsedImage {
            bbox: None,
            uri: None,
            mime_type: image_mime(img.filters.as_deref()),
            width: u32::try_from(img.width).ok(),
            height: u32::try_from(img.height).ok(),
        })
        .collect()
}

fn image_mime(filters: Option<&[String]>) -> Option<String> {
    let filters = filters?;
    if filters.iter().any(|f| f == "DCTDecode") {
        Some("image/jpeg".to_string())
    } else if filters.iter().any(|f| f == "JPXDecode") {
        Some("image/jp2".to_string())
    } else if filters.iter().any(|f| f == "FlateDecode") {
        Some("image/png".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    fn build_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages.len() as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[tokio::test]
    async fn test_parse_pages_in_order() {
        let bytes = build_pdf(&["Arrays", "Loops", "Functions"]);
        let doc = PdfParser::new()
            .parse(&bytes, "application/pdf")
            .await
            .unwrap();

        assert_eq!(doc.page_count, 3);
        assert_eq!(doc.skipped_pages, 0);
        let numbers: Vec<u32> = doc.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(doc.pages[1].text.contains("Loops"));
    }

    #[tokio::test]
    async fn test_garbage_bytes_fail() {
        let result = PdfParser::new()
            .parse(b"definitely not a pdf", "application/pdf")
            .await;
        assert!(matches!(result, Err(ParseError::Failed(_))));
    }

    #[test]
    fn test_image_mime() {
        assert_eq!(
            image_mime(Some(&["DCTDecode".to_string()])).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(image_mime(Some(&["CCITTFaxDecode".to_string()])), None);
        assert_eq!(image_mime(None), None);
    }
}
