//! # coursemind-extract
//!
//! Turns uploaded files into [`ParsedDocument`](coursemind_core::ParsedDocument)s.
//!
//! | Parser | Formats | Notes |
//! |--------|---------|-------|
//! | [`RemoteParser`] | PDF, slides, Word | External parsing service with OCR |
//! | [`PdfParser`] | PDF | Local per-page text via lopdf, image metadata |
//! | [`TextParser`] | notes, markdown, source code | Form feeds split pages |
//!
//! [`ParserRegistry`] picks a parser by MIME type, then by extension, and
//! rejects unsupported formats before any parser runs. [`HttpFetcher`]
//! downloads stored files by URL.

pub mod fetch;
pub mod pdf;
pub mod registry;
pub mod remote;
pub mod text;

pub use fetch::{HttpFetcher, parse_file_url};
pub use pdf::PdfParser;
pub use registry::{ParserRegistry, resolve_mime};
pub use remote::{RemoteParser, RemoteParserConfig};
pub use text::TextParser;
