//! `LanceDB` implementation of `VectorIndex` and `MaterialStore`.
//!
//! Each course namespace is its own table. Materials and chunk rows live in
//! two shared tables created by [`MaterialStore::init`].

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{
    Array, ArrayRef, BooleanArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow_schema::Schema;
use async_trait::async_trait;
use coursemind_core::{
    Chunk, ChunkMetadata, EMBEDDING, Material, MaterialStore, Namespace, RetrievalFilter,
    RetrievalResult, StoreError, StoreStats, VectorIndex, VectorQuery, VectorRecord,
};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table, connect};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::schema::{
    CHUNKS_TABLE, MATERIALS_TABLE, chunks_schema, materials_schema, vectors_schema,
};

/// LanceDB-backed storage.
pub struct LanceStore {
    /// Path to the `LanceDB` database
    db_path: PathBuf,
    /// Embedding dimension
    embedding_dim: usize,
    /// Database connection (lazy initialized)
    connection: RwLock<Option<Connection>>,
    /// Open table handles by name
    tables: RwLock<HashMap<String, Table>>,
    /// Held across the existence check and the create in `ensure_table`
    create_lock: Mutex<()>,
}

impl LanceStore {
    /// Create a new `LanceStore`.
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            embedding_dim: EMBEDDING.dimension,
            connection: RwLock::new(None),
            tables: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get or create connection.
    async fn get_connection(&self) -> Result<Connection, StoreError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn = self.connection.write().await;
        if let Some(ref c) = *conn {
            return Ok(c.clone());
        }
        let db_path_str = self.db_path.to_string_lossy().to_string();
        let new_conn = connect(&db_path_str)
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to connect to LanceDB: {e}")))?;
        *conn = Some(new_conn.clone());
        Ok(new_conn)
    }

    /// Open a table, or `None` when it does not exist yet.
    async fn find_table(&self, name: &str) -> Result<Option<Table>, StoreError> {
        if let Some(table) = self.tables.read().await.get(name) {
            return Ok(Some(table.clone()));
        }

        let conn = self.get_connection().await?;
        let names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to list tables: {e}")))?;
        if !names.iter().any(|n| n == name) {
            return Ok(None);
        }

        let table = conn
            .open_table(name)
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to open table {name}: {e}")))?;
        self.tables
            .write()
            .await
            .insert(name.to_string(), table.clone());
        Ok(Some(table))
    }

    /// Open a table, creating it empty with `schema` if missing.
    async fn ensure_table(&self, name: &str, schema: Schema) -> Result<Table, StoreError> {
        if let Some(table) = self.find_table(name).await? {
            return Ok(table);
        }

        // Concurrent first writes to one namespace must not both create it.
        let _guard = self.create_lock.lock().await;
        if let Some(table) = self.find_table(name).await? {
            return Ok(table);
        }

        info!("Creating table {}", name);
        let conn = self.get_connection().await?;
        let table = conn
            .create_empty_table(name, Arc::new(schema))
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to create table {name}: {e}")))?;
        self.tables
            .write()
            .await
            .insert(name.to_string(), table.clone());
        Ok(table)
    }

    async fn record_table(&self, name: &str) -> Result<Table, StoreError> {
        self.find_table(name)
            .await?
            .ok_or_else(|| StoreError::Init(format!("Table {name} missing, call init first")))
    }

    async fn create_db_dir(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Init(format!("Failed to create db directory: {e}")))?;
        }
        Ok(())
    }

    /// Convert vector records to an Arrow `RecordBatch`.
    fn vectors_to_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch, StoreError> {
        let schema = Arc::new(vectors_schema(self.embedding_dim));
        let metadata: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<Result<_, _>>()
            .map_err(|e| StoreError::Insert(format!("Failed to encode metadata: {e}")))?;

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.id.to_string()),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.metadata.course_id.to_string()),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.metadata.material_id.to_string()),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.metadata.category.as_str()),
            )),
            Arc::new(UInt32Array::from(
                records
                    .iter()
                    .map(|r| r.metadata.week_number)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.metadata.chunk_type.as_str()),
            )),
            Arc::new(UInt32Array::from_iter_values(
                records.iter().map(|r| r.metadata.chunk_order),
            )),
            Arc::new(BooleanArray::from(
                records.iter().map(|r| r.metadata.is_code).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                records
                    .iter()
                    .map(|r| r.metadata.language.as_deref())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.content.as_str()),
            )),
            Arc::new(StringArray::from(metadata)),
            build_vector_array(records, self.embedding_dim)?,
        ];

        RecordBatch::try_new(schema, columns)
            .map_err(|e| StoreError::Insert(format!("Failed to create record batch: {e}")))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() == self.embedding_dim {
            Ok(())
        } else {
            Err(StoreError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: vector.len(),
            })
        }
    }
}

fn build_vector_array(records: &[VectorRecord], dim: usize) -> Result<ArrayRef, StoreError> {
    let mut builder = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);
    for record in records {
        if record.vector.len() != dim {
            return Err(StoreError::DimensionMismatch {
                expected: dim,
                actual: record.vector.len(),
            });
        }
        builder.values().append_slice(&record.vector);
        builder.append(true);
    }
    Ok(Arc::new(builder.finish()))
}

fn material_to_batch(material: &Material) -> Result<RecordBatch, StoreError> {
    let record = serde_json::to_string(material)
        .map_err(|e| StoreError::Insert(format!("Failed to encode material: {e}")))?;
    RecordBatch::try_new(
        Arc::new(materials_schema()),
        vec![
            Arc::new(StringArray::from(vec![material.id.to_string()])),
            Arc::new(StringArray::from(vec![material.course_id.to_string()])),
            Arc::new(BooleanArray::from(vec![material.is_indexed])),
            Arc::new(UInt32Array::from(vec![material.chunk_count])),
            Arc::new(UInt32Array::from(vec![material.vector_count])),
            Arc::new(StringArray::from(vec![record])),
        ],
    )
    .map_err(|e| StoreError::Insert(format!("Failed to create record batch: {e}")))
}

fn chunks_to_batch(chunks: &[Chunk]) -> Result<RecordBatch, StoreError> {
    let records: Vec<String> = chunks
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<_, _>>()
        .map_err(|e| StoreError::Insert(format!("Failed to encode chunk: {e}")))?;

    RecordBatch::try_new(
        Arc::new(chunks_schema()),
        vec![
            Arc::new(StringArray::from_iter_values(
                chunks.iter().map(|c| c.id.to_string()),
            )),
            Arc::new(StringArray::from_iter_values(
                chunks.iter().map(|c| c.material_id.to_string()),
            )),
            Arc::new(StringArray::from_iter_values(
                chunks.iter().map(|c| c.course_id.to_string()),
            )),
            Arc::new(UInt32Array::from_iter_values(
                chunks.iter().map(|c| c.chunk_order),
            )),
            Arc::new(StringArray::from_iter_values(
                chunks.iter().map(|c| c.chunk_type.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(Chunk::content))),
            Arc::new(StringArray::from(records)),
        ],
    )
    .map_err(|e| StoreError::Insert(format!("Failed to create record batch: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Schema(format!("Missing column {name}")))
}

/// Decode the JSON `record` column of every row.
fn decode_records<T: serde::de::DeserializeOwned>(
    batch: &RecordBatch,
) -> Result<Vec<T>, StoreError> {
    let column = string_column(batch, "record")?;
    (0..batch.num_rows())
        .map(|i| {
            serde_json::from_str(column.value(i))
                .map_err(|e| StoreError::Schema(format!("Corrupt record: {e}")))
        })
        .collect()
}

fn batch_to_results(batch: &RecordBatch) -> Result<Vec<RetrievalResult>, StoreError> {
    let ids = string_column(batch, "id")?;
    let contents = string_column(batch, "content")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let chunk_id = Uuid::parse_str(ids.value(i))
            .map_err(|e| StoreError::Schema(format!("Invalid chunk id: {e}")))?;
        let metadata: ChunkMetadata = serde_json::from_str(metadata.value(i))
            .map_err(|e| StoreError::Schema(format!("Corrupt metadata: {e}")))?;
        let score = distances.map_or(0.0, |d| {
            if d.is_null(i) { 0.0 } else { 1.0 - d.value(i) }
        });

        results.push(RetrievalResult {
            chunk_id,
            content: contents.value(i).to_string(),
            metadata,
            score,
        });
    }
    Ok(results)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL predicate equivalent to [`RetrievalFilter::matches`].
pub fn filter_predicate(filter: &RetrievalFilter) -> String {
    let mut clauses = vec![format!("course_id = {}", quote(&filter.course_id.to_string()))];
    if let Some(id) = filter.material_id {
        clauses.push(format!("material_id = {}", quote(&id.to_string())));
    }
    if let Some(category) = filter.category {
        clauses.push(format!("category = {}", quote(category.as_str())));
    }
    if let Some(week) = filter.week_number {
        clauses.push(format!("week_number = {week}"));
    }
    if let Some(chunk_type) = filter.chunk_type {
        clauses.push(format!("chunk_type = {}", quote(chunk_type.as_str())));
    }
    if let Some(is_code) = filter.is_code {
        clauses.push(format!("is_code = {is_code}"));
    }
    if let Some(language) = &filter.language {
        clauses.push(format!("language = {}", quote(language)));
    }
    clauses.join(" AND ")
}

fn material_predicate(material_id: Uuid) -> String {
    format!("material_id = {}", quote(&material_id.to_string()))
}

async fn count_rows(table: &Table, predicate: Option<String>) -> Result<u64, StoreError> {
    table
        .count_rows(predicate)
        .await
        .map(|n| n as u64)
        .map_err(|e| StoreError::Query(format!("Failed to count rows: {e}")))
}

async fn query_records<T: serde::de::DeserializeOwned>(
    table: &Table,
    predicate: Option<String>,
) -> Result<Vec<T>, StoreError> {
    let mut query = table.query();
    if let Some(predicate) = predicate {
        query = query.only_if(predicate);
    }
    let mut stream = query
        .execute()
        .await
        .map_err(|e| StoreError::Query(format!("Failed to execute query: {e}")))?;

    let mut records = Vec::new();
    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| StoreError::Query(format!("Failed to fetch rows: {e}")))?
    {
        records.extend(decode_records(&batch)?);
    }
    Ok(records)
}

#[async_trait]
impl VectorIndex for LanceStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.create_db_dir().await?;
        self.get_connection().await?;
        info!("LanceDB vector index ready at {:?}", self.db_path);
        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &Namespace,
        records: &[VectorRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let table = self
            .ensure_table(namespace.as_str(), vectors_schema(self.embedding_dim))
            .await?;
        let batch = self.vectors_to_batch(records)?;

        let ids: Vec<String> = records.iter().map(|r| quote(&r.id.to_string())).collect();
        table
            .delete(&format!("id IN ({})", ids.join(", ")))
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to replace vectors: {e}")))?;

        let schema = batch.schema();
        table
            .add(Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema)))
            .execute()
            .await
            .map_err(|e| StoreError::Insert(format!("Failed to insert vectors: {e}")))?;

        debug!("Upserted {} vectors into {}", records.len(), namespace);
        Ok(())
    }

    async fn search(&self, query: VectorQuery) -> Result<Vec<RetrievalResult>, StoreError> {
        self.check_dimension(&query.vector)?;
        let namespace = query.filter.namespace();
        let Some(table) = self.find_table(namespace.as_str()).await? else {
            debug!("Namespace {} does not exist", namespace);
            return Ok(Vec::new());
        };
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let predicate = filter_predicate(&query.filter);
        debug!("Searching {} where {} (limit {})", namespace, predicate, query.limit);

        let mut stream = table
            .vector_search(query.vector.clone())
            .map_err(|e| StoreError::Query(format!("Failed to create search query: {e}")))?
            .distance_type(DistanceType::Cosine)
            .only_if(predicate)
            .limit(query.limit)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to execute search: {e}")))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch results: {e}")))?
        {
            results.extend(batch_to_results(&batch)?);
        }

        results.sort_by(RetrievalResult::ranking);
        results.truncate(query.limit);
        debug!("Found {} results", results.len());
        Ok(results)
    }

    async fn delete_material(
        &self,
        namespace: &Namespace,
        material_id: Uuid,
    ) -> Result<u64, StoreError> {
        let Some(table) = self.find_table(namespace.as_str()).await? else {
            return Ok(0);
        };
        let predicate = material_predicate(material_id);
        let removed = count_rows(&table, Some(predicate.clone())).await?;
        table
            .delete(&predicate)
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to delete vectors: {e}")))?;
        debug!("Deleted {} vectors of material {}", removed, material_id);
        Ok(removed)
    }

    async fn count(&self, namespace: &Namespace) -> Result<u64, StoreError> {
        match self.find_table(namespace.as_str()).await? {
            Some(table) => count_rows(&table, None).await,
            None => Ok(0),
        }
    }
}

#[async_trait]
impl MaterialStore for LanceStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.create_db_dir().await?;
        self.ensure_table(MATERIALS_TABLE, materials_schema()).await?;
        self.ensure_table(CHUNKS_TABLE, chunks_schema()).await?;
        info!("LanceDB material store initialized");
        Ok(())
    }

    async fn upsert_material(&self, material: &Material) -> Result<(), StoreError> {
        debug!("Upserting material {}", material.id);
        let table = self.record_table(MATERIALS_TABLE).await?;
        table
            .delete(&material_predicate(material.id))
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to replace material: {e}")))?;

        let batch = material_to_batch(material)?;
        let schema = batch.schema();
        table
            .add(Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema)))
            .execute()
            .await
            .map_err(|e| StoreError::Insert(format!("Failed to insert material: {e}")))?;
        Ok(())
    }

    async fn get_material(&self, id: Uuid) -> Result<Option<Material>, StoreError> {
        let table = self.record_table(MATERIALS_TABLE).await?;
        let materials: Vec<Material> = query_records(&table, Some(material_predicate(id))).await?;
        Ok(materials.into_iter().next())
    }

    async fn delete_material(&self, id: Uuid) -> Result<bool, StoreError> {
        let table = self.record_table(MATERIALS_TABLE).await?;
        let predicate = material_predicate(id);
        let existed = count_rows(&table, Some(predicate.clone())).await? > 0;
        table
            .delete(&predicate)
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to delete material: {e}")))?;
        self.delete_chunks(id).await?;
        Ok(existed)
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let table = self.record_table(CHUNKS_TABLE).await?;
        let batch = chunks_to_batch(chunks)?;
        let schema = batch.schema();
        table
            .add(Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema)))
            .execute()
            .await
            .map_err(|e| StoreError::Insert(format!("Failed to insert chunks: {e}")))?;
        debug!("Inserted {} chunk rows", chunks.len());
        Ok(())
    }

    async fn get_chunks(&self, material_id: Uuid) -> Result<Vec<Chunk>, StoreError> {
        let table = self.record_table(CHUNKS_TABLE).await?;
        let mut chunks: Vec<Chunk> =
            query_records(&table, Some(material_predicate(material_id))).await?;
        chunks.sort_by_key(|c| c.chunk_order);
        Ok(chunks)
    }

    async fn delete_chunks(&self, material_id: Uuid) -> Result<u64, StoreError> {
        let table = self.record_table(CHUNKS_TABLE).await?;
        let predicate = material_predicate(material_id);
        let removed = count_rows(&table, Some(predicate.clone())).await?;
        table
            .delete(&predicate)
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to delete chunks: {e}")))?;
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let materials_table = self.record_table(MATERIALS_TABLE).await?;
        let chunks_table = self.record_table(CHUNKS_TABLE).await?;

        let materials: Vec<Material> = query_records(&materials_table, None).await?;
        let courses: HashSet<Uuid> = materials.iter().map(|m| m.course_id).collect();

        Ok(StoreStats {
            total_materials: materials.len() as u64,
            indexed_materials: materials.iter().filter(|m| m.is_indexed).count() as u64,
            total_chunks: count_rows(&chunks_table, None).await?,
            total_vectors: materials.iter().map(|m| u64::from(m.vector_count)).sum(),
            namespaces: courses.len() as u64,
        })
    }
}
