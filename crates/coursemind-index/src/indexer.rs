//! Main ingestion service.
//!
//! One run takes a registered material from file URL to searchable vectors:
//! fetch → parse → chunk → persist chunk rows → embed → upsert → mark indexed.
//! Chunk rows are written before any embedding call, so a failed embedding or
//! upsert leaves durable rows and `is_indexed = false`. [`IndexerService::reembed`]
//! recovers from that state without parsing again.

use coursemind_core::{
    Chunk, ChunkType, Chunker, Error, Material, MaterialStore, Result, SourceFetcher,
    VectorIndex, VectorRecord,
};
use coursemind_embed::EmbedderPool;
use coursemind_extract::{ParserRegistry, parse_file_url, resolve_mime};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Index update events.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexUpdate {
    Started {
        material_id: Uuid,
    },
    Completed {
        material_id: Uuid,
        chunk_count: u32,
        vector_count: u32,
    },
    Failed {
        material_id: Uuid,
        error: String,
    },
}

impl IndexUpdate {
    pub fn material_id(&self) -> Uuid {
        match self {
            Self::Started { material_id }
            | Self::Completed { material_id, .. }
            | Self::Failed { material_id, .. } => *material_id,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub material_id: Uuid,
    pub chunk_count: u32,
    pub vector_count: u32,
    pub page_count: u32,
    pub skipped_pages: u32,
    pub table_chunks: u32,
    pub code_chunks: u32,
}

/// Rows removed by [`IndexerService::remove_index`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub chunks_removed: u64,
    pub vectors_removed: u64,
}

/// Material ids with a run in progress.
#[derive(Default)]
struct InFlight(Mutex<HashSet<Uuid>>);

/// Releases a material when dropped, including on panic or error.
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    material_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.material_id);
    }
}

/// Main ingestion service.
pub struct IndexerService {
    /// Relational store
    store: Arc<dyn MaterialStore>,
    /// Vector index
    index: Arc<dyn VectorIndex>,
    /// Object storage fetcher
    fetcher: Arc<dyn SourceFetcher>,
    /// Parser registry
    parsers: Arc<ParserRegistry>,
    /// Chunking strategy
    chunker: Arc<dyn Chunker>,
    /// Embedder pool
    embedder: Arc<EmbedderPool>,
    /// Materials currently being indexed
    in_flight: Arc<InFlight>,
    /// Update broadcast
    update_tx: broadcast::Sender<IndexUpdate>,
}

impl IndexerService {
    /// Create a new ingestion service.
    pub fn new(
        store: Arc<dyn MaterialStore>,
        index: Arc<dyn VectorIndex>,
        fetcher: Arc<dyn SourceFetcher>,
        parsers: Arc<ParserRegistry>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<EmbedderPool>,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(256);

        Self {
            store,
            index,
            fetcher,
            parsers,
            chunker,
            embedder,
            in_flight: Arc::new(InFlight::default()),
            update_tx,
        }
    }

    /// Subscribe to index updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexUpdate> {
        self.update_tx.subscribe()
    }

    /// The relational store this service writes to.
    pub fn store(&self) -> Arc<dyn MaterialStore> {
        Arc::clone(&self.store)
    }

    /// Register or update a material's descriptive fields.
    ///
    /// Indexing status is owned by this service and survives re-registration.
    pub async fn register(&self, mut material: Material) -> Result<Material> {
        if material.title.trim().is_empty() {
            return Err(Error::Validation("material title is required".to_string()));
        }

        if let Some(existing) = self.store.get_material(material.id).await? {
            if existing.course_id != material.course_id {
                return Err(Error::Validation(format!(
                    "material {} belongs to course {}",
                    material.id, existing.course_id
                )));
            }
            material.is_indexed = existing.is_indexed;
            material.chunk_count = existing.chunk_count;
            material.vector_count = existing.vector_count;
            material.indexed_at = existing.indexed_at;
            material.created_at = existing.created_at;
        }

        self.store.upsert_material(&material).await?;
        debug!("Registered material {} ({})", material.id, material.title);
        Ok(material)
    }

    /// Ingest a material from its stored file.
    pub async fn ingest(&self, material_id: Uuid, file_url: &str) -> Result<IngestReport> {
        let file_url = file_url.trim();
        if file_url.is_empty() {
            return Err(Error::Validation("file_url is required".to_string()));
        }
        parse_file_url(file_url).map_err(|e| Error::Validation(e.to_string()))?;

        let _guard = self.claim(material_id)?;
        let mut material = self.load(material_id).await?;

        self.notify(IndexUpdate::Started { material_id });
        info!("Ingesting material {} from {}", material_id, file_url);

        let result = self.run(&mut material, file_url).await;
        self.finish(material_id, result)
    }

    /// Recompute vectors from the chunk rows already stored.
    pub async fn reembed(&self, material_id: Uuid) -> Result<IngestReport> {
        let _guard = self.claim(material_id)?;
        let mut material = self.load(material_id).await?;

        let chunks = self.store.get_chunks(material_id).await?;
        if chunks.is_empty() {
            return Err(Error::NotFound(format!(
                "material {material_id} has no chunks, ingest it first"
            )));
        }

        self.notify(IndexUpdate::Started { material_id });
        info!("Re-embedding {} chunks of material {}", chunks.len(), material_id);

        let result: Result<IngestReport> = async {
            self.remove_vectors(&material).await;
            let vector_count = self.index_chunks(&mut material, &chunks).await?;
            Ok(report(&material, &chunks, vector_count))
        }
        .await;
        self.finish(material_id, result)
    }

    /// Remove a material's chunks and vectors and reset its status.
    pub async fn remove_index(&self, material_id: Uuid) -> Result<RemovalReport> {
        let _guard = self.claim(material_id)?;
        let mut material = self.load(material_id).await?;

        let chunks_removed = self.store.delete_chunks(material_id).await?;
        let vectors_removed = self.remove_vectors(&material).await;

        material.mark_unindexed(0);
        self.store.upsert_material(&material).await?;

        info!(
            "Removed index of material {} ({} chunks, {} vectors)",
            material_id, chunks_removed, vectors_removed
        );
        Ok(RemovalReport {
            chunks_removed,
            vectors_removed,
        })
    }

    fn claim(&self, material_id: Uuid) -> Result<InFlightGuard> {
        let mut active = self
            .in_flight
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !active.insert(material_id) {
            return Err(Error::IndexingInProgress(material_id));
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            material_id,
        })
    }

    async fn load(&self, material_id: Uuid) -> Result<Material> {
        self.store
            .get_material(material_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("material {material_id}")))
    }

    fn notify(&self, update: IndexUpdate) {
        let _ = self.update_tx.send(update);
    }

    fn finish(&self, material_id: Uuid, result: Result<IngestReport>) -> Result<IngestReport> {
        match &result {
            Ok(report) => {
                info!(
                    "Indexed material {} ({} chunks, {} vectors)",
                    material_id, report.chunk_count, report.vector_count
                );
                self.notify(IndexUpdate::Completed {
                    material_id,
                    chunk_count: report.chunk_count,
                    vector_count: report.vector_count,
                });
            }
            Err(e) => {
                error!("Failed to index material {}: {}", material_id, e);
                self.notify(IndexUpdate::Failed {
                    material_id,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn run(&self, material: &mut Material, file_url: &str) -> Result<IngestReport> {
        // Reject unsupported formats before downloading anything
        self.parsers
            .check_supported(material.mime_type.as_deref(), file_url)?;

        let file = self.fetcher.fetch(file_url).await?;
        let file_name = file.file_name.as_deref().unwrap_or(file_url);
        let mime_type = resolve_mime(
            material.mime_type.as_deref().or(file.mime_type.as_deref()),
            Some(file_name),
        );
        debug!("Fetched {} bytes ({})", file.bytes.len(), mime_type);

        let document = self
            .parsers
            .parse(&file.bytes, &mime_type, Some(file_name))
            .await?;
        if document.skipped_pages > 0 {
            warn!(
                "Skipped {} of {} pages of material {}",
                document.skipped_pages, document.page_count, material.id
            );
        }

        let chunks = self.chunker.chunk(&document.pages, material).await?;
        debug!("Chunked material {} into {} chunks", material.id, chunks.len());

        // Replace the previous run's rows and vectors
        let replaced = self.store.delete_chunks(material.id).await?;
        if replaced > 0 {
            debug!("Deleted {} previous chunk rows", replaced);
        }
        self.remove_vectors(material).await;

        if let Err(e) = self.store.insert_chunks(&chunks).await {
            self.record_incomplete(material, 0).await;
            return Err(e.into());
        }

        let vector_count = self.index_chunks(material, &chunks).await?;

        let mut report = report(material, &chunks, vector_count);
        report.page_count = document.page_count;
        report.skipped_pages = document.skipped_pages;
        Ok(report)
    }

    /// Embed persisted chunks, upsert their vectors and mark the material
    /// indexed. On failure the material is left unindexed.
    async fn index_chunks(&self, material: &mut Material, chunks: &[Chunk]) -> Result<u32> {
        match self.embed_and_upsert(material, chunks).await {
            Ok(vector_count) => {
                material.mark_indexed(chunks.len() as u32, vector_count);
                self.store.upsert_material(material).await?;
                Ok(vector_count)
            }
            Err(e) => {
                self.record_incomplete(material, chunks.len() as u32).await;
                Err(Error::PartialIngestion {
                    material_id: material.id,
                    chunks_persisted: chunks.len(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn embed_and_upsert(&self, material: &Material, chunks: &[Chunk]) -> Result<u32> {
        if chunks.is_empty() {
            warn!("Material {} produced no chunks", material.id);
            return Ok(0);
        }

        let contents: Vec<String> = chunks.iter().map(Chunk::content).collect();
        let texts: Vec<&str> = contents.iter().map(String::as_str).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(contents)
            .zip(embeddings)
            .map(|((chunk, content), output)| VectorRecord {
                id: chunk.id,
                vector: output.embedding,
                content,
                metadata: chunk.metadata(),
            })
            .collect();

        self.index.upsert(&material.namespace(), &records).await?;
        Ok(records.len() as u32)
    }

    /// Best-effort vector removal. A failure leaves stale vectors behind.
    async fn remove_vectors(&self, material: &Material) -> u64 {
        match self
            .index
            .delete_material(&material.namespace(), material.id)
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to delete vectors of material {}: {}", material.id, e);
                0
            }
        }
    }

    async fn record_incomplete(&self, material: &mut Material, chunks_persisted: u32) {
        material.mark_unindexed(chunks_persisted);
        if let Err(e) = self.store.upsert_material(material).await {
            warn!("Failed to record incomplete state of {}: {}", material.id, e);
        }
    }
}

fn report(material: &Material, chunks: &[Chunk], vector_count: u32) -> IngestReport {
    IngestReport {
        material_id: material.id,
        chunk_count: chunks.len() as u32,
        vector_count,
        page_count: 0,
        skipped_pages: 0,
        table_chunks: chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkType::Table)
            .count() as u32,
        code_chunks: chunks.iter().filter(|c| c.is_code).count() as u32,
    }
}
