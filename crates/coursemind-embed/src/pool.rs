//! Embedder pool for batched, bounded-concurrency embedding.

use std::sync::Arc;

use async_trait::async_trait;
use coursemind_core::{EMBEDDING, EmbedError, Embedder, EmbeddingOutput};
use futures::{StreamExt, TryStreamExt, stream};
use tokio::sync::Semaphore;
use tracing::debug;

/// Splits work into batches and runs a bounded number of them at once.
///
/// Output order always matches input order, and every output is checked
/// against the shared embedding dimension.
pub struct EmbedderPool {
    embedder: Arc<dyn Embedder>,
    /// Semaphore to limit concurrent provider calls
    semaphore: Semaphore,
    max_concurrent: usize,
    batch_size: usize,
}

impl EmbedderPool {
    /// Create a new embedder pool.
    pub fn new(embedder: Arc<dyn Embedder>, max_concurrent: usize, batch_size: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            batch_size: batch_size.max(1),
        }
    }

    /// Get the underlying embedder.
    pub fn inner(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Embed any number of texts.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts in batches of {} ({} concurrent)",
            texts.len(),
            self.batch_size,
            self.max_concurrent
        );

        let pending: Vec<_> = texts
            .chunks(self.batch_size)
            .map(|batch| self.embed_permitted(batch))
            .collect();
        let batches: Vec<Vec<EmbeddingOutput>> = stream::iter(pending)
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        let outputs: Vec<EmbeddingOutput> = batches.into_iter().flatten().collect();
        if outputs.len() != texts.len() {
            return Err(EmbedError::InvalidResponse(format!(
                "got {} embeddings for {} inputs",
                outputs.len(),
                texts.len()
            )));
        }
        Ok(outputs)
    }

    async fn embed_permitted(&self, batch: &[&str]) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| EmbedError::Request(format!("semaphore error: {e}")))?;

        let outputs = self.embedder.embed_text(batch).await?;
        for output in &outputs {
            check_dimension(output)?;
        }
        Ok(outputs)
    }

    /// Get pool statistics.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get max concurrent operations.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

fn check_dimension(output: &EmbeddingOutput) -> Result<(), EmbedError> {
    if output.embedding.len() == EMBEDDING.dimension {
        Ok(())
    } else {
        Err(EmbedError::DimensionMismatch {
            expected: EMBEDDING.dimension,
            actual: output.embedding.len(),
        })
    }
}

#[async_trait]
impl Embedder for EmbedderPool {
    fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    fn is_ready(&self) -> bool {
        self.embedder.is_ready()
    }

    async fn embed_text(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        self.embed_batch(texts).await
    }

    async fn embed_query(&self, query: &str) -> Result<EmbeddingOutput, EmbedError> {
        let output = {
            let _permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|e| EmbedError::Request(format!("semaphore error: {e}")))?;
            self.embedder.embed_query(query).await?
        };
        check_dimension(&output)?;
        Ok(output)
    }
}
