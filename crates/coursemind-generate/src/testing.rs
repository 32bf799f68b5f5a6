//! Test doubles shared by the generator tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use coursemind_core::{
    Category, Chunk, ChunkType, GenerateError, GenerationRequest, LanguageModel, Material,
    Namespace, VectorIndex, VectorRecord,
};
use coursemind_embed::HashEmbedder;
use coursemind_query::{Retriever, RetrieverConfig};
use coursemind_store::MemoryIndex;
use uuid::Uuid;

/// Records every request and answers with a fixed reply.
pub struct RecordingModel {
    reply: Option<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl RecordingModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerateError> {
        self.requests.lock().unwrap().push(request.clone());
        self.reply
            .clone()
            .ok_or_else(|| GenerateError::Request("connection refused".to_string()))
    }
}

/// An in-memory index with the hash embedder.
pub struct Fixture {
    pub index: Arc<MemoryIndex>,
    embedder: Arc<HashEmbedder>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            index: Arc::new(MemoryIndex::new()),
            embedder: Arc::new(HashEmbedder::new()),
        }
    }

    pub fn retriever(&self) -> Arc<Retriever> {
        Arc::new(Retriever::new(
            self.index.clone(),
            self.embedder.clone(),
            RetrieverConfig::default(),
        ))
    }

    /// Index one material with one text chunk per page.
    pub async fn seed(&self, course_id: Uuid, title: &str, category: Category, pages: &[&str]) {
        let material = Material::new(course_id, title, category);
        let records: Vec<VectorRecord> = pages
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let page = i as u32 + 1;
                let chunk = Chunk {
                    id: Uuid::new_v4(),
                    material_id: material.id,
                    course_id,
                    chunk_order: i as u32,
                    chunk_type: ChunkType::Text,
                    page_number: page,
                    header: format!("[{title} - {} - Page {page}]", category.as_str().to_uppercase()),
                    text: text.to_string(),
                    is_code: false,
                    language: None,
                    table: None,
                    material: material.snapshot(),
                    created_at: Utc::now(),
                };
                VectorRecord {
                    id: chunk.id,
                    vector: self.embedder.embed_one(&chunk.content()),
                    content: chunk.content(),
                    metadata: chunk.metadata(),
                }
            })
            .collect();
        self.index
            .upsert(&Namespace::for_course(course_id), &records)
            .await
            .unwrap();
    }
}
