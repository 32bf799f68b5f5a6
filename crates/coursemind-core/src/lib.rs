//! # coursemind-core
//!
//! Core types and traits for coursemind, a retrieval-augmented generation
//! pipeline over course materials.
//!
//! ## Architecture
//!
//! ```text
//! write path:  SourceFetcher → DocumentParser → Chunker → MaterialStore
//!                                                   ↓
//!                                    Embedder → VectorIndex (namespace per course)
//!
//! read path:   question → Embedder → VectorIndex::search → LanguageModel
//! ```
//!
//! Both paths share the chunk metadata schema in [`types`]: every vector
//! carries a [`ChunkMetadata`] snapshot so retrieval filters need no join.
//!
//! ## Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`SourceFetcher`] | Fetch uploaded file bytes |
//! | [`DocumentParser`] | Parse bytes into [`ParsedPage`]s |
//! | [`Chunker`] | Split pages into [`Chunk`]s |
//! | [`Embedder`] | Generate vector embeddings |
//! | [`VectorIndex`] | Namespace-scoped vector storage and search |
//! | [`MaterialStore`] | Durable material and chunk rows |
//! | [`LanguageModel`] | Grounded text and JSON generation |
//!
//! The embedding model and dimension are fixed by [`EMBEDDING`].

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    ChunkError, EmbedError, Error, ErrorClass, GenerateError, ParseError, Result, StoreError,
};
pub use traits::*;
pub use types::*;
