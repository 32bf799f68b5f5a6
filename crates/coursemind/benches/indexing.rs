//! Benchmarks for the write path.
//!
//! Measures throughput of text parsing, chunking with code classification,
//! and the full parse → chunk → embed → upsert pipeline on the in-memory
//! backends.

use async_trait::async_trait;
use coursemind_chunker::{SlidingWindowChunker, classify_chunk};
use coursemind_core::{
    Category, ChunkConfig, Chunker, DocumentParser, FetchedFile, Material, MaterialStore,
    ParseError, SourceFetcher,
};
use coursemind_embed::{EmbedderPool, HashEmbedder};
use coursemind_extract::{ParserRegistry, TextParser};
use coursemind_index::IndexerService;
use coursemind_store::{MemoryIndex, MemoryStore};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use uuid::Uuid;

/// Sample lecture notes for benchmarking.
const SAMPLE_NOTES: &str = r#"
Week 4: Iteration

A loop repeats a block of statements while a condition holds. The two common
forms are the counted loop and the conditional loop.

for (int i = 0; i < n; i++) {
    sum += values[i];
}

A while loop checks its condition before every iteration, so the body may run
zero times. Prefer a counted loop when the number of iterations is known.

def total(values):
    result = 0
    for v in values:
        result += v
    return result

Common mistakes include off-by-one bounds and forgetting to update the loop
variable, which produces an infinite loop.
"#;

/// Generate notes of roughly `size_kb` kilobytes, one page per repetition.
fn generate_notes(size_kb: usize) -> String {
    let repetitions = (size_kb * 1024) / SAMPLE_NOTES.len() + 1;
    vec![SAMPLE_NOTES; repetitions].join("\u{c}")
}

/// Serves the same bytes for every URL.
struct StaticFetcher(Vec<u8>);

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedFile, ParseError> {
        Ok(FetchedFile {
            bytes: self.0.clone(),
            mime_type: Some("text/plain".to_string()),
            file_name: Some("notes.txt".to_string()),
        })
    }
}

fn parsing_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let parser = TextParser::new();

    let mut group = c.benchmark_group("parsing");
    for size_kb in [1, 10, 100] {
        let notes = generate_notes(size_kb);
        group.throughput(Throughput::Bytes(notes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("text_parse", format!("{size_kb}kb")),
            &notes,
            |b, notes| {
                b.to_async(&rt)
                    .iter(|| async { black_box(parser.parse(notes.as_bytes(), "text/plain").await) });
            },
        );
    }
    group.finish();
}

fn chunking_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let chunker = SlidingWindowChunker::new(ChunkConfig::default()).unwrap();
    let parser = TextParser::new();
    let material = Material::new(Uuid::new_v4(), "Iteration", Category::Lab);

    let mut group = c.benchmark_group("chunking");
    for size_kb in [1, 10, 50] {
        let notes = generate_notes(size_kb);
        let pages = rt
            .block_on(parser.parse(notes.as_bytes(), "text/plain"))
            .unwrap()
            .pages;

        group.throughput(Throughput::Bytes(notes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("sliding_window", format!("{size_kb}kb")),
            &pages,
            |b, pages| {
                b.to_async(&rt)
                    .iter(|| async { black_box(chunker.chunk(pages, &material).await) });
            },
        );
    }

    group.bench_function("classify_chunk", |b| {
        b.iter(|| black_box(classify_chunk(SAMPLE_NOTES)));
    });
    group.finish();
}

fn pipeline_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    for size_kb in [10, 50] {
        let notes = generate_notes(size_kb);
        let store = Arc::new(MemoryStore::new());
        let mut parsers = ParserRegistry::new();
        parsers.register(TextParser::new());
        let indexer = IndexerService::new(
            store.clone(),
            Arc::new(MemoryIndex::new()),
            Arc::new(StaticFetcher(notes.clone().into_bytes())),
            Arc::new(parsers),
            Arc::new(SlidingWindowChunker::new(ChunkConfig::default()).unwrap()),
            Arc::new(EmbedderPool::new(Arc::new(HashEmbedder::new()), 4, 64)),
        );
        let material = Material::new(Uuid::new_v4(), "Iteration", Category::Lab);
        rt.block_on(store.upsert_material(&material)).unwrap();

        group.throughput(Throughput::Bytes(notes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("ingest", format!("{size_kb}kb")),
            &material.id,
            |b, id| {
                b.to_async(&rt).iter(|| async {
                    black_box(
                        indexer
                            .ingest(*id, "https://files.example.com/notes.txt")
                            .await,
                    )
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    parsing_benchmark,
    chunking_benchmark,
    pipeline_benchmark
);
criterion_main!(benches);
