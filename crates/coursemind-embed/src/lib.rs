//! # coursemind-embed
//!
//! Embedding providers for coursemind. All of them produce vectors of
//! [`EMBEDDING`](coursemind_core::EMBEDDING)`.dimension` length.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`OpenAiEmbedder`] | OpenAI-compatible HTTP embeddings with retry and backoff |
//! | [`HashEmbedder`] | Offline feature hashing for development and tests |
//! | [`EmbedderPool`] | Batching with a bounded number of concurrent calls |

pub mod hash;
pub mod openai;
pub mod pool;

pub use hash::HashEmbedder;
pub use openai::{OpenAiEmbedder, OpenAiEmbedderConfig};
pub use pool::EmbedderPool;
