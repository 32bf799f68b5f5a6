//! Material ingestion for coursemind.
//!
//! This crate provides the write path that processes a material through:
//! fetch → parse → chunk → persist → embed → upsert.
//!
//! # Components
//!
//! - [`IndexerService`]: Coordinates one ingestion run per material
//! - [`IndexUpdate`]: Events emitted during indexing
//! - [`IngestReport`]: Counts returned by a successful run
//!
//! # Example
//!
//! ```rust,ignore
//! use coursemind_index::{IndexerService, IndexUpdate};
//!
//! let indexer = IndexerService::new(store, index, fetcher, parsers, chunker, embedder);
//!
//! // Subscribe to updates
//! let mut updates = indexer.subscribe();
//!
//! let report = indexer.ingest(material_id, "https://files.example.com/week3.pdf").await?;
//!
//! while let Ok(update) = updates.recv().await {
//!     match update {
//!         IndexUpdate::Completed { chunk_count, .. } => { /* ... */ }
//!         IndexUpdate::Failed { error, .. } => { /* ... */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod indexer;

pub use indexer::{IndexUpdate, IndexerService, IngestReport, RemovalReport};
