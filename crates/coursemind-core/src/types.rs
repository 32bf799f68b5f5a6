//! Core types for coursemind.
//!
//! This module holds the chunk and metadata schema shared by the write path
//! (parse, chunk, embed, index) and the read path (retrieve, generate):
//!
//! ## Materials
//! - [`Material`]: An uploaded course document plus its indexing status
//! - [`Category`], [`MaterialKind`]: Material classification
//! - [`MaterialSnapshot`]: Denormalized material metadata carried by chunks
//!
//! ## Parsing
//! - [`ParsedDocument`], [`ParsedPage`], [`ParsedTable`], [`ParsedImage`]
//!
//! ## Chunks
//! - [`Chunk`]: The atomic retrievable unit
//! - [`ChunkType`], [`TableShape`], [`CodeClassification`]
//! - [`ChunkConfig`]: Sliding window parameters
//!
//! ## Embeddings
//! - [`EmbeddingSpec`] and [`EMBEDDING`]: The one model/dimension pair used
//!   for both indexing and querying
//!
//! ## Vector index
//! - [`Namespace`]: Per-course partition
//! - [`VectorRecord`], [`ChunkMetadata`], [`VectorQuery`]
//! - [`RetrievalFilter`], [`RetrievalResult`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ChunkError, Error};

// ============================================================================
// Materials
// ============================================================================

/// Material category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Theory,
    Lab,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Theory => "theory",
            Self::Lab => "lab",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "theory" => Ok(Self::Theory),
            "lab" => Ok(Self::Lab),
            other => Err(Error::Validation(format!(
                "invalid category '{other}', expected 'theory' or 'lab'"
            ))),
        }
    }
}

/// Declared type of an uploaded material.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Slides,
    #[default]
    Pdf,
    Code,
    Notes,
    Video,
    Other,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slides => "slides",
            Self::Pdf => "pdf",
            Self::Code => "code",
            Self::Notes => "notes",
            Self::Video => "video",
            Self::Other => "other",
        }
    }
}

impl FromStr for MaterialKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slides" => Ok(Self::Slides),
            "pdf" => Ok(Self::Pdf),
            "code" => Ok(Self::Code),
            "notes" => Ok(Self::Notes),
            "video" => Ok(Self::Video),
            "other" => Ok(Self::Other),
            other => Err(Error::Validation(format!("invalid material type '{other}'"))),
        }
    }
}

/// An uploaded course document.
///
/// Identity and descriptive fields are owned by the course management shell.
/// The pipeline only touches the indexing status fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Unique material identifier
    pub id: Uuid,
    /// Owning course
    pub course_id: Uuid,
    /// Display title
    pub title: String,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Theory or lab
    pub category: Category,
    /// Declared document type
    #[serde(default)]
    pub kind: MaterialKind,
    /// Retrievable URL of the stored file
    #[serde(default)]
    pub file_url: Option<String>,
    /// MIME type declared at upload
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Topic label
    #[serde(default)]
    pub topic: Option<String>,
    /// Course week
    #[serde(default)]
    pub week_number: Option<u32>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Declared programming language for code materials
    #[serde(default)]
    pub programming_language: Option<String>,
    /// Whether every chunk has a vector
    #[serde(default)]
    pub is_indexed: bool,
    /// Chunks persisted by the last successful run
    #[serde(default)]
    pub chunk_count: u32,
    /// Vectors stored by the last successful run
    #[serde(default)]
    pub vector_count: u32,
    /// When the last successful run finished
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Material {
    /// Create an unindexed material with only the required fields set.
    pub fn new(course_id: Uuid, title: impl Into<String>, category: Category) -> Self {
        Self {
            id: Uuid::new_v4(),
            course_id,
            title: title.into(),
            description: None,
            category,
            kind: MaterialKind::default(),
            file_url: None,
            mime_type: None,
            topic: None,
            week_number: None,
            tags: Vec::new(),
            programming_language: None,
            is_indexed: false,
            chunk_count: 0,
            vector_count: 0,
            indexed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Metadata copied onto every chunk at indexing time.
    pub fn snapshot(&self) -> MaterialSnapshot {
        MaterialSnapshot {
            course_id: self.course_id,
            material_id: self.id,
            title: self.title.clone(),
            category: self.category,
            kind: self.kind,
            topic: self.topic.clone(),
            week_number: self.week_number,
            tags: self.tags.clone(),
        }
    }

    /// Vector namespace of the owning course.
    pub fn namespace(&self) -> Namespace {
        Namespace::for_course(self.course_id)
    }

    /// Record a completed indexing run.
    pub fn mark_indexed(&mut self, chunk_count: u32, vector_count: u32) {
        self.is_indexed = true;
        self.chunk_count = chunk_count;
        self.vector_count = vector_count;
        self.indexed_at = Some(Utc::now());
    }

    /// Record an incomplete run. Chunk rows may exist without vectors.
    pub fn mark_unindexed(&mut self, chunk_count: u32) {
        self.is_indexed = false;
        self.chunk_count = chunk_count;
        self.vector_count = 0;
        self.indexed_at = None;
    }
}

/// Material metadata denormalized onto chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSnapshot {
    pub course_id: Uuid,
    pub material_id: Uuid,
    pub title: String,
    pub category: Category,
    pub kind: MaterialKind,
    pub topic: Option<String>,
    pub week_number: Option<u32>,
    pub tags: Vec<String>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Output of a document parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Pages that parsed successfully, in page order
    pub pages: Vec<ParsedPage>,
    /// Pages that failed and were skipped
    pub skipped_pages: u32,
    /// Total pages in the source document
    pub page_count: u32,
}

impl ParsedDocument {
    pub fn table_count(&self) -> usize {
        self.pages.iter().map(|p| p.tables.len()).sum()
    }

    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

/// One page of a parsed document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPage {
    /// Page number (1-indexed)
    pub page_number: u32,
    /// Plain text
    pub text: String,
    /// Markdown rendering, when the parser produces one
    #[serde(default)]
    pub markdown: Option<String>,
    /// Extracted tables
    #[serde(default)]
    pub tables: Vec<ParsedTable>,
    /// Extracted images
    #[serde(default)]
    pub images: Vec<ParsedImage>,
}

impl ParsedPage {
    pub fn text(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Bounding box in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A table extracted from a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTable {
    /// Cell text, row-major
    pub rows: Vec<Vec<String>>,
    /// Location on the page
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

impl ParsedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Widest row, so ragged tables still report a column count.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// An image extracted from a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedImage {
    /// Location on the page
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    /// Where the image can be retrieved
    #[serde(default)]
    pub uri: Option<String>,
    /// Image MIME type
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

// ============================================================================
// Chunks
// ============================================================================

/// Chunk content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Text,
    Code,
    Table,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Table => "table",
        }
    }
}

impl FromStr for ChunkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "code" => Ok(Self::Code),
            "table" => Ok(Self::Table),
            other => Err(Error::Validation(format!("invalid chunk type '{other}'"))),
        }
    }
}

/// Shape of a table chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableShape {
    pub rows: u32,
    pub columns: u32,
    pub bbox: Option<BoundingBox>,
}

/// Result of the heuristic code classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeClassification {
    pub is_code: bool,
    pub language: Option<String>,
}

impl CodeClassification {
    pub fn code(language: &str) -> Self {
        Self {
            is_code: true,
            language: Some(language.to_string()),
        }
    }
}

/// A chunk of a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier, also the vector id
    pub id: Uuid,
    /// Owning material
    pub material_id: Uuid,
    /// Owning course
    pub course_id: Uuid,
    /// Position within the material, across all pages and tables
    pub chunk_order: u32,
    /// Content type
    pub chunk_type: ChunkType,
    /// Source page (1-indexed)
    pub page_number: u32,
    /// Context header, e.g. `[Intro to C - LAB - Page 5]`
    pub header: String,
    /// Raw window text, or table JSON
    pub text: String,
    /// Set by the code classifier
    pub is_code: bool,
    /// Detected programming language
    pub language: Option<String>,
    /// Table shape for table chunks
    pub table: Option<TableShape>,
    /// Material metadata at indexing time
    pub material: MaterialSnapshot,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Header-prefixed content. This is what gets embedded and stored.
    pub fn content(&self) -> String {
        format!("{}\n{}", self.header, self.text)
    }

    /// Flattened metadata for the vector index.
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            course_id: self.course_id,
            material_id: self.material_id,
            material_title: self.material.title.clone(),
            category: self.material.category,
            material_kind: self.material.kind,
            topic: self.material.topic.clone(),
            week_number: self.material.week_number,
            tags: self.material.tags.clone(),
            chunk_type: self.chunk_type,
            chunk_order: self.chunk_order,
            page_number: self.page_number,
            is_code: self.is_code,
            language: self.language.clone(),
            table_rows: self.table.map(|t| t.rows),
            table_columns: self.table.map(|t| t.columns),
        }
    }
}

const OVERLAP_EPSILON: f64 = 1e-9;

/// Sliding window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Window length in characters
    pub chunk_size: usize,
    /// Fraction of each window repeated in the next
    pub overlap_fraction: f64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap_fraction: 0.2,
        }
    }
}

impl ChunkConfig {
    /// `floor(chunk_size * overlap_fraction)`.
    ///
    /// The product is nudged by a tiny epsilon so that fractions with no exact
    /// binary form (0.35, 0.7) floor to the decimal result instead of one less.
    pub fn overlap(&self) -> usize {
        (self.chunk_size as f64 * self.overlap_fraction + OVERLAP_EPSILON).floor() as usize
    }

    /// Distance between consecutive window starts.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap()
    }

    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.overlap_fraction) {
            return Err(ChunkError::InvalidConfig(format!(
                "overlap_fraction must be in [0, 1), got {}",
                self.overlap_fraction
            )));
        }
        if self.step() == 0 {
            return Err(ChunkError::InvalidConfig(
                "overlap leaves no room for the window to advance".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Embedding
// ============================================================================

/// Embedding model and dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmbeddingSpec {
    pub model: &'static str,
    pub dimension: usize,
}

/// The embedding configuration used for indexing and for queries.
pub const EMBEDDING: EmbeddingSpec = EmbeddingSpec {
    model: "text-embedding-3-small",
    dimension: 1024,
};

/// Output from embedding.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// The embedding vector
    pub embedding: Vec<f32>,
    /// Number of tokens in input
    pub token_count: usize,
}

// ============================================================================
// Vector index
// ============================================================================

/// Vector index partition for one course.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    pub fn for_course(course_id: Uuid) -> Self {
        Self(format!("course_{course_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored alongside every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub course_id: Uuid,
    pub material_id: Uuid,
    pub material_title: String,
    pub category: Category,
    pub material_kind: MaterialKind,
    pub topic: Option<String>,
    pub week_number: Option<u32>,
    pub tags: Vec<String>,
    pub chunk_type: ChunkType,
    pub chunk_order: u32,
    pub page_number: u32,
    pub is_code: bool,
    pub language: Option<String>,
    pub table_rows: Option<u32>,
    pub table_columns: Option<u32>,
}

/// One embedded chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Chunk id
    pub id: Uuid,
    /// Embedding vector
    pub vector: Vec<f32>,
    /// Header-prefixed chunk content
    pub content: String,
    /// Chunk metadata
    pub metadata: ChunkMetadata,
}

/// Exact-match metadata predicates, combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalFilter {
    /// Selects the namespace; always required
    pub course_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<ChunkType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_code: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl RetrievalFilter {
    pub fn course(course_id: Uuid) -> Self {
        Self {
            course_id,
            material_id: None,
            category: None,
            week_number: None,
            chunk_type: None,
            is_code: None,
            language: None,
        }
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::for_course(self.course_id)
    }

    /// True when every set predicate matches exactly.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        metadata.course_id == self.course_id
            && self.material_id.is_none_or(|id| metadata.material_id == id)
            && self.category.is_none_or(|c| metadata.category == c)
            && self
                .week_number
                .is_none_or(|w| metadata.week_number == Some(w))
            && self.chunk_type.is_none_or(|t| metadata.chunk_type == t)
            && self.is_code.is_none_or(|c| metadata.is_code == c)
            && self
                .language
                .as_deref()
                .is_none_or(|l| metadata.language.as_deref() == Some(l))
    }
}

/// A namespace-scoped similarity query.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    /// Query embedding
    pub vector: Vec<f32>,
    /// Metadata filter; its course selects the namespace
    pub filter: RetrievalFilter,
    /// Maximum results to return
    pub limit: usize,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: Uuid,
    /// Header-prefixed chunk content
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity, higher is better
    pub score: f32,
}

impl RetrievalResult {
    /// Descending score, then ascending position within the material.
    pub fn ranking(a: &Self, b: &Self) -> Ordering {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.metadata.chunk_order.cmp(&b.metadata.chunk_order))
            .then_with(|| a.metadata.material_id.cmp(&b.metadata.material_id))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    }
}

/// Store statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_materials: u64,
    pub indexed_materials: u64,
    pub total_chunks: u64,
    pub total_vectors: u64,
    pub namespaces: u64,
}
