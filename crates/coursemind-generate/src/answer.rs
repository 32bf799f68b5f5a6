//! Grounded question answering.

use std::sync::Arc;

use coursemind_core::{
    Error, GenerateError, GenerationRequest, LanguageModel, Result, RetrievalFilter,
};
use coursemind_query::Retriever;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::{Source, build_context, has_lab_content, sources};
use crate::prompt;

/// Message returned when retrieval finds nothing.
pub const NO_RELEVANT_CONTENT: &str =
    "No relevant content found. The course materials may not be indexed yet.";

/// Sampling settings for answers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1000,
        }
    }
}

/// Retrieval facts reported with an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub chunk_count: usize,
    pub filters: RetrievalFilter,
    pub has_lab_content: bool,
    pub model: String,
}

/// Model output plus the sources it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundedAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub metadata: AnswerMetadata,
}

/// Outcome of [`AnswerGenerator::ask`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Answer {
    Grounded(GroundedAnswer),
    /// Nothing matched; the model was not called
    NoRelevantContent,
}

/// Answers questions from retrieved course content only.
pub struct AnswerGenerator {
    retriever: Arc<Retriever>,
    model: Arc<dyn LanguageModel>,
    config: AnswerConfig,
}

impl AnswerGenerator {
    pub fn new(
        retriever: Arc<Retriever>,
        model: Arc<dyn LanguageModel>,
        config: AnswerConfig,
    ) -> Self {
        Self {
            retriever,
            model,
            config,
        }
    }

    /// Retrieve, then answer from what was retrieved.
    ///
    /// Missing embedding or model credentials fail before retrieval runs.
    pub async fn ask(
        &self,
        question: &str,
        filter: RetrievalFilter,
        top_k: Option<usize>,
    ) -> Result<Answer> {
        ensure_ready(&self.retriever, self.model.as_ref())?;

        let results = self.retriever.search(question, filter.clone(), top_k).await?;
        if results.is_empty() {
            info!("No relevant content for question in {}", filter.namespace());
            return Ok(Answer::NoRelevantContent);
        }

        let lab = has_lab_content(&results);
        let request = GenerationRequest {
            system: prompt::answer_system(lab),
            prompt: prompt::answer_prompt(&build_context(&results), question.trim()),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_schema: None,
        };

        debug!(
            "Generating answer from {} chunks (lab content: {})",
            results.len(),
            lab
        );
        let answer = self.model.generate(&request).await?;

        Ok(Answer::Grounded(GroundedAnswer {
            answer,
            sources: sources(&results),
            metadata: AnswerMetadata {
                chunk_count: results.len(),
                filters: filter,
                has_lab_content: lab,
                model: self.model.model_name().to_string(),
            },
        }))
    }
}

pub(crate) fn ensure_ready(retriever: &Retriever, model: &dyn LanguageModel) -> Result<()> {
    if !retriever.is_ready() {
        return Err(Error::Config(
            "embedding provider is not configured".to_string(),
        ));
    }
    if !model.is_ready() {
        return Err(GenerateError::NotConfigured(format!(
            "language model '{}' has no credentials",
            model.model_name()
        ))
        .into());
    }
    Ok(())
}
