//! Chunking for coursemind.
//!
//! Pages are split independently with a fixed-size sliding window; tables
//! become their own chunks. Every chunk gets a context header and a code
//! classification.

pub mod classify;
pub mod header;
pub mod table;
pub mod window;

pub use classify::classify_chunk;
pub use header::context_header;
pub use window::{SlidingWindowChunker, TextWindow, sliding_windows};
