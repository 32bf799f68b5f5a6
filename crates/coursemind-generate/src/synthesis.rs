//! Structured content synthesis from retrieved course material.
//!
//! Retrieval and context assembly match [`crate::AnswerGenerator`]; only the
//! instruction and the output contract differ. Model output is parsed and
//! checked against the form's shape before it is returned.

use std::sync::Arc;

use coursemind_core::{
    GenerateError, GenerationRequest, LanguageModel, ResponseSchema, Result, RetrievalFilter,
};
use coursemind_query::Retriever;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::answer::ensure_ready;
use crate::context::{Source, build_context, sources};
use crate::prompt;

/// Settings for both synthesis forms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Chunks retrieved for the short form
    pub short_top_k: usize,
    /// Chunks retrieved for the long form
    pub long_top_k: usize,
    pub temperature: f32,
    pub short_max_tokens: u32,
    pub long_max_tokens: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            short_top_k: 10,
            long_top_k: 15,
            temperature: 0.3,
            short_max_tokens: 1000,
            long_max_tokens: 4000,
        }
    }
}

/// Short form: a title and a few paragraphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShortContent {
    pub title: String,
    pub description: String,
}

/// Long form, suitable for document export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LongContent {
    pub title: String,
    pub introduction: String,
    /// Markdown
    pub main_content: String,
    pub summary: Vec<String>,
    pub references: Vec<String>,
}

/// Output shapes the synthesizer can produce.
pub trait SynthesisForm: DeserializeOwned + Send {
    fn schema() -> ResponseSchema;

    fn prompt(context: &str, request: &str) -> String;

    /// Reject structurally valid but empty output.
    fn check(&self) -> std::result::Result<(), String>;
}

impl SynthesisForm for ShortContent {
    fn schema() -> ResponseSchema {
        prompt::short_schema()
    }

    fn prompt(context: &str, request: &str) -> String {
        prompt::short_prompt(context, request)
    }

    fn check(&self) -> std::result::Result<(), String> {
        non_blank("title", &self.title)?;
        non_blank("description", &self.description)
    }
}

impl SynthesisForm for LongContent {
    fn schema() -> ResponseSchema {
        prompt::long_schema()
    }

    fn prompt(context: &str, request: &str) -> String {
        prompt::long_prompt(context, request)
    }

    fn check(&self) -> std::result::Result<(), String> {
        non_blank("title", &self.title)?;
        non_blank("introduction", &self.introduction)?;
        non_blank("main_content", &self.main_content)?;
        if self.summary.is_empty() {
            return Err("summary is empty".to_string());
        }
        Ok(())
    }
}

fn non_blank(field: &str, value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is empty"))
    } else {
        Ok(())
    }
}

/// Generated content plus its sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedContent<T> {
    pub content: T,
    pub sources: Vec<Source>,
    pub chunk_count: usize,
    pub model: String,
}

/// Outcome of a synthesis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Synthesis<T> {
    Generated(SynthesizedContent<T>),
    /// Nothing matched; the model was not called
    NoRelevantContent,
}

/// Produces schema-constrained study content from a course.
pub struct ContentSynthesizer {
    retriever: Arc<Retriever>,
    model: Arc<dyn LanguageModel>,
    config: SynthesisConfig,
}

impl ContentSynthesizer {
    pub fn new(
        retriever: Arc<Retriever>,
        model: Arc<dyn LanguageModel>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            retriever,
            model,
            config,
        }
    }

    /// `{title, description}` for `request`.
    pub async fn short(
        &self,
        request: &str,
        filter: RetrievalFilter,
    ) -> Result<Synthesis<ShortContent>> {
        self.synthesize(
            request,
            filter,
            self.config.short_top_k,
            self.config.short_max_tokens,
        )
        .await
    }

    /// Document-length content for `request`.
    pub async fn long(
        &self,
        request: &str,
        filter: RetrievalFilter,
    ) -> Result<Synthesis<LongContent>> {
        self.synthesize(
            request,
            filter,
            self.config.long_top_k,
            self.config.long_max_tokens,
        )
        .await
    }

    async fn synthesize<T: SynthesisForm>(
        &self,
        request: &str,
        filter: RetrievalFilter,
        top_k: usize,
        max_tokens: u32,
    ) -> Result<Synthesis<T>> {
        ensure_ready(&self.retriever, self.model.as_ref())?;

        let results = self.retriever.search(request, filter.clone(), Some(top_k)).await?;
        if results.is_empty() {
            info!("No content to synthesize from in {}", filter.namespace());
            return Ok(Synthesis::NoRelevantContent);
        }

        let schema = T::schema();
        debug!("Synthesizing '{}' from {} chunks", schema.name, results.len());
        let raw = self
            .model
            .generate(&GenerationRequest {
                system: prompt::synthesis_system(),
                prompt: T::prompt(&build_context(&results), request.trim()),
                temperature: self.config.temperature,
                max_tokens,
                response_schema: Some(schema),
            })
            .await?;

        let content = parse_output::<T>(&raw)?;
        Ok(Synthesis::Generated(SynthesizedContent {
            content,
            sources: sources(&results),
            chunk_count: results.len(),
            model: self.model.model_name().to_string(),
        }))
    }
}

/// Parse model output, tolerating a surrounding markdown code fence.
fn parse_output<T: SynthesisForm>(raw: &str) -> std::result::Result<T, GenerateError> {
    let body = strip_fence(raw);
    let parsed: T = serde_json::from_str(body)
        .map_err(|e| GenerateError::InvalidOutput(format!("output does not match schema: {e}")))?;
    parsed.check().map_err(GenerateError::InvalidOutput)?;
    Ok(parsed)
}

fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
