//! In-memory backends for tests and local development.
//!
//! [`MemoryIndex`] keeps vectors per namespace and searches by brute-force
//! cosine similarity. [`MemoryStore`] keeps materials and chunk rows. Nothing
//! is persisted.

use async_trait::async_trait;
use coursemind_core::{
    Chunk, EMBEDDING, Material, MaterialStore, Namespace, RetrievalResult, StoreError,
    StoreStats, VectorIndex, VectorQuery, VectorRecord,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// In-memory vector index.
///
/// ```rust
/// use coursemind_core::{Namespace, VectorIndex};
/// use coursemind_store::MemoryIndex;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let index = MemoryIndex::new();
/// index.init().await?;
/// assert_eq!(index.count(&Namespace::for_course(uuid::Uuid::new_v4())).await?, 0);
/// # Ok(())
/// # }
/// ```
pub struct MemoryIndex {
    dimension: usize,
    namespaces: Arc<RwLock<HashMap<Namespace, HashMap<Uuid, VectorRecord>>>>,
}

impl MemoryIndex {
    /// Create an empty index using the shared embedding dimension.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING.dimension,
            namespaces: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine similarity, 0 when either vector has zero norm.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn init(&self) -> Result<(), StoreError> {
        debug!("MemoryIndex initialized");
        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        records: &[VectorRecord],
    ) -> Result<(), StoreError> {
        for record in records {
            self.check_dimension(&record.vector)?;
        }
        let mut namespaces = self.namespaces.write().await;
        let table = namespaces.entry(namespace.clone()).or_default();
        for record in records {
            table.insert(record.id, record.clone());
        }
        debug!("Upserted {} vectors into {}", records.len(), namespace);
        Ok(())
    }

    async fn search(&self, query: VectorQuery) -> Result<Vec<RetrievalResult>, StoreError> {
        self.check_dimension(&query.vector)?;
        let namespace = query.filter.namespace();
        let namespaces = self.namespaces.read().await;
        let Some(table) = namespaces.get(&namespace) else {
            debug!("Namespace {} does not exist", namespace);
            return Ok(Vec::new());
        };

        let mut results: Vec<RetrievalResult> = table
            .values()
            .filter(|record| query.filter.matches(&record.metadata))
            .map(|record| RetrievalResult {
                chunk_id: record.id,
                content: record.content.clone(),
                metadata: record.metadata.clone(),
                score: cosine_similarity(&query.vector, &record.vector),
            })
            .collect();

        results.sort_by(RetrievalResult::ranking);
        results.truncate(query.limit);
        Ok(results)
    }

    async fn delete_material(
        &self,
        namespace: &Namespace,
        material_id: Uuid,
    ) -> Result<u64, StoreError> {
        let mut namespaces = self.namespaces.write().await;
        let Some(table) = namespaces.get_mut(namespace) else {
            return Ok(0);
        };
        let before = table.len();
        table.retain(|_, record| record.metadata.material_id != material_id);
        let removed = (before - table.len()) as u64;
        debug!("Deleted {} vectors of material {}", removed, material_id);
        Ok(removed)
    }

    async fn count(&self, namespace: &Namespace) -> Result<u64, StoreError> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(namespace).map_or(0, |t| t.len() as u64))
    }
}

/// In-memory material and chunk store.
pub struct MemoryStore {
    materials: Arc<RwLock<HashMap<Uuid, Material>>>,
    chunks: Arc<RwLock<HashMap<Uuid, Vec<Chunk>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            materials: Arc::new(RwLock::new(HashMap::new())),
            chunks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// All stored materials, for listing.
    pub async fn materials(&self) -> Vec<Material> {
        self.materials.read().await.values().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MaterialStore for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        debug!("MemoryStore initialized");
        Ok(())
    }

    async fn upsert_material(&self, material: &Material) -> Result<(), StoreError> {
        self.materials
            .write()
            .await
            .insert(material.id, material.clone());
        Ok(())
    }

    async fn get_material(&self, id: Uuid) -> Result<Option<Material>, StoreError> {
        Ok(self.materials.read().await.get(&id).cloned())
    }

    async fn delete_material(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.materials.write().await.remove(&id).is_some();
        self.chunks.write().await.remove(&id);
        Ok(removed)
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        let mut stored = self.chunks.write().await;
        for chunk in chunks {
            stored
                .entry(chunk.material_id)
                .or_default()
                .push(chunk.clone());
        }
        debug!("Inserted {} chunk rows", chunks.len());
        Ok(())
    }

    async fn get_chunks(&self, material_id: Uuid) -> Result<Vec<Chunk>, StoreError> {
        let mut chunks = self
            .chunks
            .read()
            .await
            .get(&material_id)
            .cloned()
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.chunk_order);
        Ok(chunks)
    }

    async fn delete_chunks(&self, material_id: Uuid) -> Result<u64, StoreError> {
        Ok(self
            .chunks
            .write()
            .await
            .remove(&material_id)
            .map_or(0, |c| c.len() as u64))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let materials = self.materials.read().await;
        let chunks = self.chunks.read().await;
        let courses: HashSet<Uuid> = materials.values().map(|m| m.course_id).collect();

        Ok(StoreStats {
            total_materials: materials.len() as u64,
            indexed_materials: materials.values().filter(|m| m.is_indexed).count() as u64,
            total_chunks: chunks.values().map(|c| c.len() as u64).sum(),
            total_vectors: materials.values().map(|m| u64::from(m.vector_count)).sum(),
            namespaces: courses.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coursemind_core::{Category, ChunkType, RetrievalFilter};

    fn test_chunk(material: &Material, order: u32, text: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            material_id: material.id,
            course_id: material.course_id,
            chunk_order: order,
            chunk_type: ChunkType::Text,
            page_number: 1,
            header: format!("[{} - THEORY - Page 1]", material.title),
            text: text.to_string(),
            is_code: false,
            language: None,
            table: None,
            material: material.snapshot(),
            created_at: Utc::now(),
        }
    }

    /// Unit vector along one axis.
    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING.dimension];
        v[i] = 1.0;
        v
    }

    fn record(chunk: &Chunk, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: chunk.id,
            vector,
            content: chunk.content(),
            metadata: chunk.metadata(),
        }
    }

    fn query(course_id: Uuid, vector: Vec<f32>, limit: usize) -> VectorQuery {
        VectorQuery {
            vector,
            filter: RetrievalFilter::course(course_id),
            limit,
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_score() {
        let index = MemoryIndex::new();
        let material = Material::new(Uuid::new_v4(), "Loops", Category::Theory);
        let near = test_chunk(&material, 0, "near");
        let far = test_chunk(&material, 1, "far");
        let mut blend = axis(0);
        blend[1] = 1.0;

        index
            .upsert(
                &material.namespace(),
                &[record(&far, axis(1)), record(&near, blend)],
            )
            .await
            .unwrap();

        let results = index
            .search(query(material.course_id, axis(1), 5))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, far.id);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_ties_break_by_chunk_order() {
        let index = MemoryIndex::new();
        let material = Material::new(Uuid::new_v4(), "Loops", Category::Theory);
        let chunks: Vec<Chunk> = (0..4).rev().map(|i| test_chunk(&material, i, "x")).collect();
        let records: Vec<VectorRecord> = chunks.iter().map(|c| record(c, axis(0))).collect();
        index.upsert(&material.namespace(), &records).await.unwrap();

        let results = index
            .search(query(material.course_id, axis(0), 3))
            .await
            .unwrap();
        let orders: Vec<u32> = results.iter().map(|r| r.metadata.chunk_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let index = MemoryIndex::new();
        let a = Material::new(Uuid::new_v4(), "A", Category::Theory);
        let b = Material::new(Uuid::new_v4(), "B", Category::Theory);
        index
            .upsert(&a.namespace(), &[record(&test_chunk(&a, 0, "a"), axis(0))])
            .await
            .unwrap();

        let results = index.search(query(b.course_id, axis(0), 5)).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(index.count(&a.namespace()).await.unwrap(), 1);
        assert_eq!(index.count(&b.namespace()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filter_applies() {
        let index = MemoryIndex::new();
        let course_id = Uuid::new_v4();
        let theory = Material::new(course_id, "Notes", Category::Theory);
        let lab = Material::new(course_id, "Lab 1", Category::Lab);
        index
            .upsert(
                &theory.namespace(),
                &[
                    record(&test_chunk(&theory, 0, "t"), axis(0)),
                    record(&test_chunk(&lab, 0, "l"), axis(0)),
                ],
            )
            .await
            .unwrap();

        let mut q = query(course_id, axis(0), 5);
        q.filter.category = Some(Category::Lab);
        let results = index.search(q).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.material_id, lab.id);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_rejects_wrong_dimension() {
        let index = MemoryIndex::new();
        let material = Material::new(Uuid::new_v4(), "Loops", Category::Theory);
        let chunk = test_chunk(&material, 0, "x");
        index
            .upsert(&material.namespace(), &[record(&chunk, axis(0))])
            .await
            .unwrap();
        index
            .upsert(&material.namespace(), &[record(&chunk, axis(1))])
            .await
            .unwrap();
        assert_eq!(index.count(&material.namespace()).await.unwrap(), 1);

        let err = index
            .upsert(&material.namespace(), &[record(&chunk, vec![1.0; 3])])
            .await;
        assert!(matches!(
            err,
            Err(StoreError::DimensionMismatch { actual: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_material_vectors() {
        let index = MemoryIndex::new();
        let course_id = Uuid::new_v4();
        let keep = Material::new(course_id, "Keep", Category::Theory);
        let drop = Material::new(course_id, "Drop", Category::Theory);
        index
            .upsert(
                &keep.namespace(),
                &[
                    record(&test_chunk(&keep, 0, "k"), axis(0)),
                    record(&test_chunk(&drop, 0, "d"), axis(0)),
                    record(&test_chunk(&drop, 1, "d"), axis(0)),
                ],
            )
            .await
            .unwrap();

        let removed = index
            .delete_material(&drop.namespace(), drop.id)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.count(&keep.namespace()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_chunks_ordered_and_cascade() {
        let store = MemoryStore::new();
        let mut material = Material::new(Uuid::new_v4(), "Loops", Category::Theory);
        store.upsert_material(&material).await.unwrap();
        store
            .insert_chunks(&[
                test_chunk(&material, 2, "c"),
                test_chunk(&material, 0, "a"),
                test_chunk(&material, 1, "b"),
            ])
            .await
            .unwrap();

        let orders: Vec<u32> = store
            .get_chunks(material.id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.chunk_order)
            .collect();
        assert_eq!(orders, vec![0, 1, 2]);

        material.mark_indexed(3, 3);
        store.upsert_material(&material).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_materials, 1);
        assert_eq!(stats.indexed_materials, 1);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.total_vectors, 3);

        assert!(store.delete_material(material.id).await.unwrap());
        assert!(store.get_chunks(material.id).await.unwrap().is_empty());
        assert!(store.get_material(material.id).await.unwrap().is_none());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
