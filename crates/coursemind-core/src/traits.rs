//! Core traits for coursemind components.
//!
//! Each external collaborator sits behind one of these traits so that clients
//! are constructed once and passed in, and tests can substitute fakes:
//!
//! - [`SourceFetcher`]: Fetch uploaded files from object storage
//! - [`DocumentParser`]: Turn file bytes into pages
//! - [`Chunker`]: Split pages into chunks
//! - [`Embedder`]: Generate vector embeddings
//! - [`VectorIndex`]: Namespace-scoped vector upsert and search
//! - [`MaterialStore`]: Durable material and chunk records
//! - [`LanguageModel`]: Text or JSON generation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChunkError, EmbedError, GenerateError, ParseError, StoreError};
use crate::types::{
    Chunk, EmbeddingOutput, Material, Namespace, ParsedDocument, ParsedPage, RetrievalResult,
    StoreStats, VectorQuery, VectorRecord,
};

// ============================================================================
// Object Storage
// ============================================================================

/// Bytes of a fetched file.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    /// MIME type reported by the server, if any
    pub mime_type: Option<String>,
    /// Last path segment of the URL
    pub file_name: Option<String>,
}

/// Trait for retrieving stored files by URL.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedFile, ParseError>;
}

// ============================================================================
// Parsing
// ============================================================================

/// Trait for parsing documents into pages.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parser name for logs.
    fn name(&self) -> &str;

    /// Returns the MIME types this parser can handle.
    fn supported_types(&self) -> &[&str];

    /// Check if parser can handle based on file extension.
    fn can_parse_extension(&self, _extension: &str) -> bool {
        false
    }

    /// Check if this parser can handle the given file.
    fn can_parse(&self, mime_type: &str, extension: Option<&str>) -> bool {
        self.supported_types().contains(&mime_type)
            || extension.is_some_and(|ext| self.can_parse_extension(ext))
    }

    /// Parse a document. Pages that fail individually are skipped and counted.
    async fn parse(&self, data: &[u8], mime_type: &str) -> Result<ParsedDocument, ParseError>;
}

// ============================================================================
// Chunking
// ============================================================================

/// Trait for splitting parsed pages into chunks.
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Name of this chunking strategy.
    fn name(&self) -> &str;

    /// Chunk every page of one material. `chunk_order` runs across all pages.
    async fn chunk(&self, pages: &[ParsedPage], material: &Material)
    -> Result<Vec<Chunk>, ChunkError>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Trait for generating embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Whether credentials and endpoint are present.
    fn is_ready(&self) -> bool {
        true
    }

    /// Embed a batch of texts, one output per input in order.
    async fn embed_text(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>, EmbedError>;

    /// Embed a single query.
    async fn embed_query(&self, query: &str) -> Result<EmbeddingOutput, EmbedError> {
        let results = self.embed_text(&[query]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::InvalidResponse("empty embedding result".to_string()))
    }
}

// ============================================================================
// Vector Index
// ============================================================================

/// Trait for namespace-scoped vector storage and search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Initialize the index.
    async fn init(&self) -> Result<(), StoreError>;

    /// Insert or replace records in a namespace.
    async fn upsert(&self, namespace: &Namespace, records: &[VectorRecord])
    -> Result<(), StoreError>;

    /// Top-K search inside the filter's course namespace.
    ///
    /// Results are ordered by [`RetrievalResult::ranking`]. A missing namespace
    /// yields an empty list.
    async fn search(&self, query: VectorQuery) -> Result<Vec<RetrievalResult>, StoreError>;

    /// Delete every vector of a material. Returns the number removed when known.
    async fn delete_material(
        &self,
        namespace: &Namespace,
        material_id: Uuid,
    ) -> Result<u64, StoreError>;

    /// Number of vectors in a namespace.
    async fn count(&self, namespace: &Namespace) -> Result<u64, StoreError>;
}

// ============================================================================
// Relational Store
// ============================================================================

/// Trait for durable material and chunk records.
#[async_trait]
pub trait MaterialStore: Send + Sync {
    /// Initialize the store.
    async fn init(&self) -> Result<(), StoreError>;

    /// Insert or replace a material record.
    async fn upsert_material(&self, material: &Material) -> Result<(), StoreError>;

    /// Get a material record.
    async fn get_material(&self, id: Uuid) -> Result<Option<Material>, StoreError>;

    /// Delete a material and, by cascade, its chunks.
    async fn delete_material(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Insert chunk rows.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError>;

    /// All chunks of a material, ordered by `chunk_order`.
    async fn get_chunks(&self, material_id: Uuid) -> Result<Vec<Chunk>, StoreError>;

    /// Delete all chunks of a material.
    async fn delete_chunks(&self, material_id: Uuid) -> Result<u64, StoreError>;

    /// Get store statistics.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

// ============================================================================
// Language Model
// ============================================================================

/// JSON schema the model output must follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

/// A single generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Constrain output to JSON matching this schema
    pub response_schema: Option<ResponseSchema>,
}

/// Trait for language model providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Whether credentials and endpoint are present.
    fn is_ready(&self) -> bool {
        true
    }

    /// Generate text, or a JSON document when a schema is given.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerateError>;
}
