//! Query execution.

use coursemind_core::{
    EMBEDDING, EmbedError, Embedder, Error, Result, RetrievalFilter, RetrievalResult,
    VectorIndex, VectorQuery,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::parser::ParsedQuery;

/// Result count limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Used when a request does not set `top_k`
    pub default_top_k: usize,
    /// Larger requests are clamped to this
    pub max_top_k: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
        }
    }
}

/// Embeds a query and searches one course namespace.
pub struct Retriever {
    /// Vector index
    index: Arc<dyn VectorIndex>,
    /// Embedder for query embedding
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

impl Retriever {
    /// Create a new retriever.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    /// Whether the query embedder has credentials.
    pub fn is_ready(&self) -> bool {
        self.embedder.is_ready()
    }

    pub fn config(&self) -> RetrieverConfig {
        self.config
    }

    /// Effective result count: the default when unset, at most `max_top_k`.
    pub fn effective_top_k(&self, top_k: Option<usize>) -> Result<usize> {
        match top_k {
            Some(0) => Err(Error::Validation("top_k must be at least 1".to_string())),
            Some(k) => Ok(k.min(self.config.max_top_k)),
            None => Ok(self.config.default_top_k.min(self.config.max_top_k)),
        }
    }

    /// Top-K chunks for `query` matching every predicate in `filter`.
    ///
    /// An empty list means nothing matched; it is not an error.
    pub async fn search(
        &self,
        query: &str,
        filter: RetrievalFilter,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievalResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("query is required".to_string()));
        }
        let limit = self.effective_top_k(top_k)?;

        debug!(
            "Retrieving top {} for '{}' in {}",
            limit,
            query,
            filter.namespace()
        );

        let embedding = self.embedder.embed_query(query).await?;
        if embedding.embedding.len() != EMBEDDING.dimension {
            return Err(EmbedError::DimensionMismatch {
                expected: EMBEDDING.dimension,
                actual: embedding.embedding.len(),
            }
            .into());
        }

        let results = self
            .index
            .search(VectorQuery {
                vector: embedding.embedding,
                filter,
                limit,
            })
            .await?;

        debug!("Found {} results", results.len());
        Ok(results)
    }

    /// Execute a query parsed from the inline syntax.
    pub async fn search_parsed(&self, parsed: ParsedQuery) -> Result<Vec<RetrievalResult>> {
        self.search(&parsed.text, parsed.filter, parsed.limit).await
    }

    /// Retrieval restricted to code chunks, optionally of one language.
    pub async fn search_code(
        &self,
        query: &str,
        course_id: Uuid,
        language: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievalResult>> {
        let mut filter = RetrievalFilter::course(course_id);
        filter.is_code = Some(true);
        filter.language = language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());
        self.search(query, filter, top_k).await
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coursemind_core::{
        Category, Chunk, ChunkType, Material, Namespace, VectorRecord,
    };
    use coursemind_embed::HashEmbedder;
    use coursemind_store::MemoryIndex;

    fn chunk(material: &Material, order: u32, text: &str, language: Option<&str>) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            material_id: material.id,
            course_id: material.course_id,
            chunk_order: order,
            chunk_type: if language.is_some() {
                ChunkType::Code
            } else {
                ChunkType::Text
            },
            page_number: order + 1,
            header: format!("[{} - {} - Page {}]", material.title, material.category, order + 1),
            text: text.to_string(),
            is_code: language.is_some(),
            language: language.map(str::to_string),
            table: None,
            material: material.snapshot(),
            created_at: Utc::now(),
        }
    }

    async fn seed(index: &MemoryIndex, embedder: &HashEmbedder, chunks: &[Chunk]) {
        for chunk in chunks {
            let record = VectorRecord {
                id: chunk.id,
                vector: embedder.embed_one(&chunk.content()),
                content: chunk.content(),
                metadata: chunk.metadata(),
            };
            index
                .upsert(&Namespace::for_course(chunk.course_id), &[record])
                .await
                .unwrap();
        }
    }

    fn retriever(index: Arc<MemoryIndex>) -> Retriever {
        Retriever::new(
            index,
            Arc::new(HashEmbedder::new()),
            RetrieverConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_namespace_isolation_and_filter_conjunction() {
        let index = Arc::new(MemoryIndex::new());
        let embedder = HashEmbedder::new();
        let course_a = Uuid::new_v4();
        let course_b = Uuid::new_v4();
        let theory = Material::new(course_a, "Loops", Category::Theory);
        let lab = Material::new(course_a, "Loop lab", Category::Lab);
        let other = Material::new(course_b, "Loops elsewhere", Category::Lab);
        seed(
            &index,
            &embedder,
            &[
                chunk(&theory, 0, "loops repeat statements", None),
                chunk(&lab, 0, "write loops that sum numbers", None),
                chunk(&other, 0, "loops loops loops", None),
            ],
        )
        .await;
        let retriever = retriever(index);

        let all = retriever
            .search("loops", RetrievalFilter::course(course_a), Some(20))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.metadata.course_id == course_a));

        let mut filter = RetrievalFilter::course(course_a);
        filter.category = Some(Category::Lab);
        let labs = retriever.search("loops", filter, None).await.unwrap();
        assert_eq!(labs.len(), 1);
        assert!(labs.iter().all(|r| r.metadata.category == Category::Lab));
    }

    #[tokio::test]
    async fn test_empty_course_is_empty_not_error() {
        let retriever = retriever(Arc::new(MemoryIndex::new()));
        let results = retriever
            .search("anything", RetrievalFilter::course(Uuid::new_v4()), None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_code_search() {
        let index = Arc::new(MemoryIndex::new());
        let embedder = HashEmbedder::new();
        let material = Material::new(Uuid::new_v4(), "Week 5", Category::Lab);
        seed(
            &index,
            &embedder,
            &[
                chunk(&material, 0, "a loop repeats work", None),
                chunk(&material, 1, "for (int i = 0; i < n; i++) { sum += i; }", Some("c")),
                chunk(&material, 2, "for i in range(n): total += i", Some("python")),
            ],
        )
        .await;
        let retriever = retriever(index);

        let code = retriever
            .search_code("loop", material.course_id, None, None)
            .await
            .unwrap();
        assert_eq!(code.len(), 2);
        assert!(code.iter().all(|r| r.metadata.is_code));

        let python = retriever
            .search_code("loop", material.course_id, Some("Python"), None)
            .await
            .unwrap();
        assert_eq!(python.len(), 1);
        assert_eq!(python[0].metadata.language.as_deref(), Some("python"));
    }

    #[tokio::test]
    async fn test_validation() {
        let retriever = retriever(Arc::new(MemoryIndex::new()));
        let filter = RetrievalFilter::course(Uuid::new_v4());
        assert!(matches!(
            retriever.search("   ", filter.clone(), None).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            retriever.search("loops", filter, Some(0)).await,
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_effective_top_k() {
        let retriever = retriever(Arc::new(MemoryIndex::new()));
        assert_eq!(retriever.effective_top_k(None).unwrap(), 5);
        assert_eq!(retriever.effective_top_k(Some(8)).unwrap(), 8);
        assert_eq!(retriever.effective_top_k(Some(500)).unwrap(), 20);
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short", 500), "short");
        assert_eq!(excerpt("abcdef", 3), "abc...");
        assert_eq!(excerpt("ééééé", 2), "éé...");
        assert_eq!(excerpt("abc", 3), "abc");
    }
}
