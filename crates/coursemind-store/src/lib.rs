//! Storage layer for coursemind.
//!
//! Two backends implement both [`VectorIndex`](coursemind_core::VectorIndex)
//! and [`MaterialStore`](coursemind_core::MaterialStore):
//!
//! - [`LanceStore`]: LanceDB tables on disk, one vector table per course
//!   namespace plus `materials` and `chunks` tables
//! - [`MemoryIndex`] / [`MemoryStore`]: in-memory, for tests and local runs
//!
//! # Example
//!
//! ```rust,ignore
//! use coursemind_store::LanceStore;
//! use coursemind_core::{MaterialStore, VectorIndex};
//!
//! let store = LanceStore::new("path/to/db.lance".into());
//! VectorIndex::init(&store).await?;
//! MaterialStore::init(&store).await?;
//!
//! store.upsert(&namespace, &records).await?;
//! let results = store.search(query).await?;
//! ```

pub mod lancedb;
pub mod memory;
pub mod schema;

pub use lancedb::{LanceStore, filter_predicate};
pub use memory::{MemoryIndex, MemoryStore};
