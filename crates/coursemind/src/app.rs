//! Component wiring shared by the CLI and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use coursemind_chunker::SlidingWindowChunker;
use coursemind_core::{
    Category, ChunkConfig, Chunker, Embedder, Error, LanguageModel, Material, MaterialKind,
    MaterialStore, SourceFetcher, VectorIndex,
};
use coursemind_embed::{EmbedderPool, HashEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig};
use coursemind_extract::{
    HttpFetcher, ParserRegistry, PdfParser, RemoteParser, RemoteParserConfig, TextParser,
};
use coursemind_generate::{
    AnswerConfig, AnswerGenerator, ContentSynthesizer, OpenAiChatConfig, OpenAiChatModel,
    SynthesisConfig, UnconfiguredModel,
};
use coursemind_index::{IndexUpdate, IndexerService, IngestReport};
use coursemind_query::{QueryParser, Retriever, RetrieverConfig};
use coursemind_store::{LanceStore, MemoryIndex, MemoryStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, EmbeddingProvider, StoreBackend, credential};

/// Collaborators the pipeline is assembled from.
pub struct Components {
    pub store: Arc<dyn MaterialStore>,
    pub index: Arc<dyn VectorIndex>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub parsers: Arc<ParserRegistry>,
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<dyn Embedder>,
    pub model: Arc<dyn LanguageModel>,
}

/// Tunables that are not part of any collaborator.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub embed_batch_size: usize,
    pub embed_max_concurrent: usize,
    pub retriever: RetrieverConfig,
    pub answer: AnswerConfig,
    pub synthesis: SynthesisConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embed_batch_size: 64,
            embed_max_concurrent: 4,
            retriever: RetrieverConfig::default(),
            answer: AnswerConfig::default(),
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        let generation = &config.generation;
        Self {
            embed_batch_size: config.embedding.batch_size,
            embed_max_concurrent: config.embedding.max_concurrent,
            retriever: RetrieverConfig {
                default_top_k: generation.default_top_k,
                max_top_k: generation.max_top_k,
            },
            answer: AnswerConfig {
                temperature: generation.temperature,
                max_tokens: generation.max_tokens,
            },
            synthesis: SynthesisConfig {
                short_top_k: generation.enhanced_top_k,
                long_top_k: generation.document_top_k,
                temperature: generation.temperature,
                short_max_tokens: generation.max_tokens,
                long_max_tokens: generation.document_max_tokens,
            },
        }
    }
}

/// The assembled pipeline.
pub struct App {
    pub indexer: Arc<IndexerService>,
    pub retriever: Arc<Retriever>,
    pub answers: Arc<AnswerGenerator>,
    pub synthesizer: Arc<ContentSynthesizer>,
    pub store: Arc<dyn MaterialStore>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub parsers: Arc<ParserRegistry>,
    pub query_parser: QueryParser,
}

impl App {
    /// Assemble the pipeline from explicit collaborators.
    pub fn new(components: Components, settings: Settings) -> Self {
        let embedder_pool = Arc::new(EmbedderPool::new(
            Arc::clone(&components.embedder),
            settings.embed_max_concurrent,
            settings.embed_batch_size,
        ));

        let indexer = Arc::new(IndexerService::new(
            Arc::clone(&components.store),
            Arc::clone(&components.index),
            Arc::clone(&components.fetcher),
            Arc::clone(&components.parsers),
            components.chunker,
            embedder_pool,
        ));

        let retriever = Arc::new(Retriever::new(
            components.index,
            components.embedder,
            settings.retriever,
        ));

        let answers = Arc::new(AnswerGenerator::new(
            Arc::clone(&retriever),
            Arc::clone(&components.model),
            settings.answer,
        ));
        let synthesizer = Arc::new(ContentSynthesizer::new(
            Arc::clone(&retriever),
            components.model,
            settings.synthesis,
        ));

        Self {
            indexer,
            retriever,
            answers,
            synthesizer,
            store: components.store,
            fetcher: components.fetcher,
            parsers: components.parsers,
            query_parser: QueryParser::new(),
        }
    }

    /// Build every client from configuration and initialize storage.
    ///
    /// Missing credentials fail here, before any request is served. The one
    /// exception is the language model: without its key, ingestion and search
    /// still work and generation reports a configuration error.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (store, index) = build_storage(config)?;
        store.init().await.context("Failed to initialize material store")?;
        index.init().await.context("Failed to initialize vector index")?;

        let chunk_config = ChunkConfig {
            chunk_size: config.chunking.chunk_size,
            overlap_fraction: config.chunking.overlap_fraction,
        };
        let chunker: Arc<dyn Chunker> = Arc::new(
            SlidingWindowChunker::new(chunk_config).map_err(Error::from)?,
        );

        let fetcher: Arc<dyn SourceFetcher> = Arc::new(HttpFetcher::new(
            Duration::from_secs(config.parser.fetch_timeout_secs),
            config.parser.max_file_bytes,
        )?);

        let components = Components {
            store,
            index,
            fetcher,
            parsers: Arc::new(build_parsers(config)?),
            chunker,
            embedder: build_embedder(config)?,
            model: build_model(config),
        };
        Ok(Self::new(components, Settings::from_config(config)))
    }

    /// Ingest a material, handing every `IndexUpdate` of the run to
    /// `on_update`, including the final one sent just before `ingest` returns.
    pub async fn ingest_with_progress(
        &self,
        material_id: Uuid,
        file_url: &str,
        mut on_update: impl FnMut(IndexUpdate),
    ) -> coursemind_core::Result<IngestReport> {
        let mut updates = self.indexer.subscribe();
        let ingest = self.indexer.ingest(material_id, file_url);
        tokio::pin!(ingest);

        let result = loop {
            tokio::select! {
                result = &mut ingest => break result,
                update = updates.recv() => {
                    if let Ok(update) = update {
                        if update.material_id() == material_id {
                            on_update(update);
                        }
                    }
                }
            }
        };
        while let Ok(update) = updates.try_recv() {
            if update.material_id() == material_id {
                on_update(update);
            }
        }
        result
    }
}

fn build_storage(config: &Config) -> Result<(Arc<dyn MaterialStore>, Arc<dyn VectorIndex>)> {
    match config.store.backend {
        StoreBackend::Lancedb => {
            let db_path = config.store.resolved_db_path()?;
            info!("Using LanceDB at {}", db_path.display());
            let store = Arc::new(LanceStore::new(db_path));
            Ok((store.clone(), store))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory storage; nothing survives a restart");
            Ok((Arc::new(MemoryStore::new()), Arc::new(MemoryIndex::new())))
        }
    }
}

fn build_parsers(config: &Config) -> Result<ParserRegistry> {
    let mut parsers = ParserRegistry::new();
    if let Some(url) = config.parser.remote_url.as_deref() {
        let api_key = credential(&config.parser.remote_api_key_env).ok_or_else(|| {
            Error::Config(format!(
                "{} is not set but parser.remote_url is",
                config.parser.remote_api_key_env
            ))
        })?;
        parsers.register(RemoteParser::new(RemoteParserConfig {
            base_url: url.to_string(),
            api_key,
            ocr_languages: config.parser.ocr_languages.clone(),
            timeout: Duration::from_secs(config.parser.remote_timeout_secs),
        })?);
    }
    parsers.register(PdfParser::new());
    parsers.register(TextParser::new());
    Ok(parsers)
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedding = &config.embedding;
    match embedding.provider {
        EmbeddingProvider::Hash => {
            warn!("Using the offline hash embedder; relevance is approximate");
            Ok(Arc::new(HashEmbedder::new()))
        }
        EmbeddingProvider::Openai => {
            let api_key = credential(&embedding.api_key_env).ok_or_else(|| {
                Error::Config(format!(
                    "{} is not set; embeddings need an API key",
                    embedding.api_key_env
                ))
            })?;
            let embedder = OpenAiEmbedder::new(OpenAiEmbedderConfig {
                api_key,
                base_url: embedding.base_url.clone(),
                timeout: Duration::from_secs(embedding.timeout_secs),
                max_retries: embedding.max_retries,
                batch_size: embedding.batch_size,
            })
            .map_err(Error::from)?;
            Ok(Arc::new(embedder))
        }
    }
}

fn build_model(config: &Config) -> Arc<dyn LanguageModel> {
    let generation = &config.generation;
    let Some(api_key) = credential(&generation.api_key_env) else {
        warn!(
            "{} is not set; answers and content synthesis are disabled",
            generation.api_key_env
        );
        return Arc::new(UnconfiguredModel::new(format!(
            "{} is not set",
            generation.api_key_env
        )));
    };
    let model = OpenAiChatModel::new(OpenAiChatConfig {
        api_key,
        base_url: generation.base_url.clone(),
        model: generation.model.clone(),
        timeout: Duration::from_secs(generation.timeout_secs),
        max_retries: generation.max_retries,
    });
    match model {
        Ok(model) => Arc::new(model),
        Err(e) => Arc::new(UnconfiguredModel::new(e.to_string())),
    }
}

/// Descriptive material fields, as sent by the course management shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialInput {
    /// Required by `register`; the HTTP route takes it from the path
    #[serde(default)]
    pub id: Option<Uuid>,
    pub course_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub week_number: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub programming_language: Option<String>,
}

impl MaterialInput {
    /// Validate and convert. Category and kind are checked here so bad values
    /// are validation errors rather than deserialization failures.
    pub fn into_material(self, id: Uuid) -> coursemind_core::Result<Material> {
        let category: Category = self.category.parse()?;
        let kind = match self.kind.as_deref() {
            Some(kind) => kind.parse()?,
            None => MaterialKind::default(),
        };
        let mut material = Material::new(self.course_id, self.title, category);
        material.id = id;
        material.description = self.description;
        material.kind = kind;
        material.file_url = self.file_url;
        material.mime_type = self.mime_type;
        material.topic = self.topic;
        material.week_number = self.week_number;
        material.tags = self.tags;
        material.programming_language = self.programming_language;
        Ok(material)
    }
}
