//! Grounded answer generation for coursemind.
//!
//! Both entry points retrieve first and call the language model only when
//! retrieval found something:
//!
//! - [`AnswerGenerator`] answers a question from labelled course context.
//! - [`ContentSynthesizer`] produces schema-checked study content in a short
//!   or a long form.
//!
//! [`OpenAiChatModel`] talks to any OpenAI-compatible chat endpoint.

pub mod answer;
pub mod context;
pub mod openai;
pub mod prompt;
pub mod synthesis;

#[cfg(test)]
mod testing;

pub use answer::{
    Answer, AnswerConfig, AnswerGenerator, AnswerMetadata, GroundedAnswer, NO_RELEVANT_CONTENT,
};
pub use context::{Source, build_context, has_lab_content};
pub use openai::{OpenAiChatConfig, OpenAiChatModel, UnconfiguredModel};
pub use synthesis::{
    ContentSynthesizer, LongContent, ShortContent, Synthesis, SynthesisConfig, SynthesizedContent,
};
