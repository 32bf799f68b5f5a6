//! # coursemind CLI
//!
//! Retrieval-augmented answers over course materials. Materials are parsed,
//! chunked and embedded into one vector namespace per course; questions are
//! answered only from what retrieval finds.
//!
//! ## Commands
//!
//! - `coursemind serve` - Run the HTTP API
//! - `coursemind register <material.json>` - Register material metadata
//! - `coursemind ingest <MATERIAL_ID> <FILE_URL>` - Parse, chunk and index a material
//! - `coursemind search <COURSE_ID> <QUERY>...` - Semantic search with inline filters
//! - `coursemind ask <COURSE_ID> <QUESTION>...` - Grounded answer
//! - `coursemind stats` - Store statistics
//!
//! ## Examples
//!
//! ```bash
//! coursemind ingest 6f1c... https://files.example.com/week3.pdf
//! coursemind search 2b9e... recursion category:lab week:3
//! coursemind ask 2b9e... "how does a for loop work?" --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coursemind::config::credential;
use coursemind::server::{self, AppState};
use coursemind::{App, Config, MaterialInput};
use coursemind_core::{RetrievalFilter, RetrievalResult};
use coursemind_generate::{Answer, NO_RELEVANT_CONTENT, Synthesis};
use coursemind_index::IndexUpdate;
use coursemind_query::excerpt;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "coursemind")]
#[command(about = "Grounded question answering over course materials")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/coursemind/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind (overrides the config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Register or update a material from a JSON file
    Register {
        /// Material metadata (JSON)
        path: PathBuf,
    },

    /// Parse, chunk and index a material's file
    Ingest {
        material_id: Uuid,
        file_url: String,
    },

    /// Recompute vectors from stored chunks
    Reembed { material_id: Uuid },

    /// Remove a material's chunks and vectors
    Unindex { material_id: Uuid },

    /// Semantic search within a course
    ///
    /// Inline filters: category:lab week:3 material:<uuid> lang:python
    /// type:table code:true limit:10
    Search {
        course_id: Uuid,

        /// Query text with optional inline filters
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Answer a question from a course's materials
    Ask {
        course_id: Uuid,

        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Restrict to one material
        #[arg(long)]
        material: Option<Uuid>,

        /// Restrict to theory or lab
        #[arg(long)]
        category: Option<String>,

        /// Restrict to one week
        #[arg(long)]
        week: Option<u32>,

        /// Chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Generate study content from a course's materials
    Synthesize {
        course_id: Uuid,

        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Document-length output instead of title and description
        #[arg(long)]
        long: bool,
    },

    /// Show store statistics
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Write a default configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for search results.
#[derive(Serialize)]
struct SearchOutput {
    query: String,
    filter: RetrievalFilter,
    results: Vec<ResultItem>,
}

#[derive(Serialize)]
struct ResultItem {
    material: String,
    page: u32,
    category: String,
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    content: String,
}

impl From<&RetrievalResult> for ResultItem {
    fn from(r: &RetrievalResult) -> Self {
        Self {
            material: r.metadata.material_title.clone(),
            page: r.metadata.page_number,
            category: r.metadata.category.to_string(),
            score: r.score,
            language: r.metadata.language.clone(),
            content: truncate(&r.content, 200),
        }
    }
}

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(Some(path.clone()))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    init_logging(&cli, &config)?;

    if let Commands::Config { action } = &cli.command {
        return config_command(action, &cli, &config);
    }

    let app = Arc::new(App::from_config(&config).await?);

    match &cli.command {
        Commands::Serve { bind } => {
            let token = credential(&config.server.api_token_env);
            if token.is_none() {
                warn!(
                    "{} is not set; the API accepts unauthenticated requests",
                    config.server.api_token_env
                );
            }
            let bind = bind.clone().unwrap_or_else(|| config.server.bind.clone());
            server::serve(AppState::new(app, token), &bind).await?;
        }

        Commands::Register { path } => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let input: MaterialInput = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid material JSON in {}", path.display()))?;
            let id = input.id.unwrap_or_else(Uuid::new_v4);
            let material = app.indexer.register(input.into_material(id)?).await?;

            match cli.format {
                OutputFormat::Json => print_json(&material)?,
                OutputFormat::Text => {
                    println!("Registered {} ({})", material.title, material.id);
                    println!("  Course:  {}", material.course_id);
                    println!("  Indexed: {}", material.is_indexed);
                }
            }
        }

        Commands::Ingest {
            material_id,
            file_url,
        } => {
            let result = app
                .ingest_with_progress(*material_id, file_url, |update| match update {
                    IndexUpdate::Started { material_id } => {
                        info!("Indexing {}", material_id);
                    }
                    IndexUpdate::Completed {
                        material_id,
                        chunk_count,
                        vector_count,
                    } => {
                        info!(
                            "Indexed {} ({} chunks, {} vectors)",
                            material_id, chunk_count, vector_count
                        );
                    }
                    IndexUpdate::Failed { material_id, error } => {
                        warn!("Indexing {} failed: {}", material_id, error);
                    }
                })
                .await;
            let report = result.context("Ingestion failed")?;

            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => {
                    println!("Indexed material {}", report.material_id);
                    println!(
                        "  Pages:   {} ({} skipped)",
                        report.page_count, report.skipped_pages
                    );
                    println!(
                        "  Chunks:  {} ({} tables, {} code)",
                        report.chunk_count, report.table_chunks, report.code_chunks
                    );
                    println!("  Vectors: {}", report.vector_count);
                }
            }
        }

        Commands::Reembed { material_id } => {
            let report = app
                .indexer
                .reembed(*material_id)
                .await
                .context("Re-embedding failed")?;
            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => println!(
                    "Stored {} vectors for {} chunks",
                    report.vector_count, report.chunk_count
                ),
            }
        }

        Commands::Unindex { material_id } => {
            let report = app.indexer.remove_index(*material_id).await?;
            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => println!(
                    "Removed {} chunks and {} vectors",
                    report.chunks_removed, report.vectors_removed
                ),
            }
        }

        Commands::Search { course_id, query } => {
            let raw = query.join(" ");
            let parsed = app.query_parser.parse(*course_id, &raw)?;
            let filter = parsed.filter.clone();
            let text = parsed.text.clone();
            let results = app
                .retriever
                .search_parsed(parsed)
                .await
                .context("Search failed")?;

            match cli.format {
                OutputFormat::Json => print_json(&SearchOutput {
                    query: text,
                    filter,
                    results: results.iter().map(ResultItem::from).collect(),
                })?,
                OutputFormat::Text => {
                    println!("Query: {text}\n");
                    if results.is_empty() {
                        println!("{NO_RELEVANT_CONTENT}");
                    }
                    for (i, result) in results.iter().enumerate() {
                        let item = ResultItem::from(result);
                        println!(
                            "{}. {} - page {} [{}] (score: {:.3})",
                            i + 1,
                            item.material,
                            item.page,
                            item.category,
                            item.score
                        );
                        if let Some(language) = &item.language {
                            println!("   Code: {language}");
                        }
                        println!("   {}", truncate(&result.content, 100));
                        println!();
                    }
                }
            }
        }

        Commands::Ask {
            course_id,
            question,
            material,
            category,
            week,
            top_k,
        } => {
            let mut filter = RetrievalFilter::course(*course_id);
            filter.material_id = *material;
            filter.category = category.as_deref().map(str::parse).transpose()?;
            filter.week_number = *week;

            let answer = app.answers.ask(&question.join(" "), filter, *top_k).await?;
            match cli.format {
                OutputFormat::Json => print_json(&answer)?,
                OutputFormat::Text => match answer {
                    Answer::Grounded(grounded) => {
                        println!("{}\n", grounded.answer);
                        println!("Sources:");
                        for source in &grounded.sources {
                            println!(
                                "  [{}] {} - page {} ({})",
                                source.label,
                                source.material_title,
                                source.page_number,
                                source.category
                            );
                        }
                    }
                    Answer::NoRelevantContent => println!("{NO_RELEVANT_CONTENT}"),
                },
            }
        }

        Commands::Synthesize {
            course_id,
            prompt,
            long,
        } => {
            let prompt = prompt.join(" ");
            let filter = RetrievalFilter::course(*course_id);
            if *long {
                let result = app.synthesizer.long(&prompt, filter).await?;
                match (cli.format, result) {
                    (OutputFormat::Json, result) => print_json(&result)?,
                    (OutputFormat::Text, Synthesis::Generated(generated)) => {
                        let c = &generated.content;
                        println!("# {}\n\n{}\n\n{}\n", c.title, c.introduction, c.main_content);
                        println!("## Summary");
                        for point in &c.summary {
                            println!("- {point}");
                        }
                        println!("\n## References");
                        for reference in &c.references {
                            println!("- {reference}");
                        }
                    }
                    (OutputFormat::Text, Synthesis::NoRelevantContent) => {
                        println!("{NO_RELEVANT_CONTENT}");
                    }
                }
            } else {
                let result = app.synthesizer.short(&prompt, filter).await?;
                match (cli.format, result) {
                    (OutputFormat::Json, result) => print_json(&result)?,
                    (OutputFormat::Text, Synthesis::Generated(generated)) => {
                        println!("{}\n\n{}", generated.content.title, generated.content.description);
                    }
                    (OutputFormat::Text, Synthesis::NoRelevantContent) => {
                        println!("{NO_RELEVANT_CONTENT}");
                    }
                }
            }
        }

        Commands::Stats => {
            let stats = app.store.stats().await?;
            match cli.format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Text => {
                    println!("Store statistics");
                    println!(
                        "  Materials: {} ({} indexed)",
                        stats.total_materials, stats.indexed_materials
                    );
                    println!("  Chunks:    {}", stats.total_chunks);
                    println!("  Vectors:   {}", stats.total_vectors);
                    println!("  Courses:   {}", stats.namespaces);
                }
            }
        }

        Commands::Config { action } => config_command(action, &cli, &config)?,
    }

    Ok(())
}

fn config_command(action: &ConfigAction, cli: &Cli, config: &Config) -> Result<()> {
    let path = cli.config.clone().or_else(Config::config_path);
    match action {
        ConfigAction::Show => match cli.format {
            OutputFormat::Json => print_json(config)?,
            OutputFormat::Text => println!(
                "{}",
                toml::to_string_pretty(config).context("Failed to serialize config")?
            ),
        },
        ConfigAction::Init => {
            let path = path.context("Could not determine config directory")?;
            Config::write_default(&path)?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Path => match path {
            Some(path) => println!("{}", path.display()),
            None => println!("Could not determine config directory"),
        },
    }
    Ok(())
}

/// Truncate to `max_chars` characters on one line, adding an ellipsis if cut.
fn truncate(s: &str, max_chars: usize) -> String {
    let flat = s.replace('\n', " ").replace('\r', "");
    excerpt(&flat, max_chars.saturating_sub(3))
}
