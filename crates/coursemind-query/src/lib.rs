//! Retrieval for coursemind.
//!
//! [`Retriever`] embeds a question with the shared embedding configuration
//! and runs a filtered top-K search inside one course namespace.
//! [`QueryParser`] reads the inline `key:value` filters used on the command
//! line.

pub mod parser;
pub mod retriever;

pub use parser::{ParsedQuery, QueryParser};
pub use retriever::{Retriever, RetrieverConfig, excerpt};
