//! CLI - subcommand definitions and implementations.
//!
//! `build` indexes a directory of PDFs; `chat` and `query` answer
//! questions over the persisted index through a local Ollama daemon;
//! `status` reports on storage and backend availability.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::RagConfig;
use crate::embedding::OllamaEmbedding;
use crate::error::RagError;
use crate::generator::{Answer, OllamaGenerator};
use crate::index::VectorIndex;
use crate::pipeline::{build_index, QueryPipeline};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docchat-rag")]
#[command(version, about = "Local PDF RAG chat over Ollama", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Configuration flags shared by all subcommands.
#[derive(Args, Clone)]
pub struct ConfigArgs {
    /// Source document directory
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Persisted index directory
    #[arg(long)]
    pub storage: Option<PathBuf>,

    /// Ollama base URL (or OLLAMA_BASE_URL env)
    #[arg(long)]
    pub ollama_url: Option<String>,

    /// Generation model
    #[arg(long)]
    pub model: Option<String>,

    /// Embedding model
    #[arg(long)]
    pub embed_model: Option<String>,

    /// Embedding dimension
    #[arg(long)]
    pub embed_dim: Option<usize>,

    /// Generation timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl ConfigArgs {
    fn into_config(self) -> RagConfig {
        let mut config = RagConfig {
            source_dir: self.data_dir,
            ..Default::default()
        };
        if let Some(storage) = self.storage {
            config.storage_dir = storage;
        }
        if let Some(url) = self.ollama_url {
            config.ollama_url = url;
        }
        if let Some(model) = self.model {
            config.generation_model = model;
        }
        if let Some(model) = self.embed_model {
            config.embedding_model = model;
        }
        if let Some(dim) = self.embed_dim {
            config.embedding_dimension = dim;
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index the source directory into the vector store
    Build {
        #[command(flatten)]
        config: ConfigArgs,

        /// Accepted file extensions
        #[arg(long, default_values_t = vec!["pdf".to_string()])]
        ext: Vec<String>,
    },

    /// Interactive chat over the indexed documents
    Chat {
        #[command(flatten)]
        config: ConfigArgs,

        /// Retrieved chunks per question
        #[arg(short = 'k', long, default_value = "2")]
        top_k: usize,
    },

    /// Ask a single question
    Query {
        /// The question
        question: String,

        #[command(flatten)]
        config: ConfigArgs,

        /// Retrieved chunks per question
        #[arg(short = 'k', long, default_value = "2")]
        top_k: usize,
    },

    /// Show configuration, index and backend status
    Status {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// Execute the parsed command.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build { config, ext } => {
            let mut config = config.into_config();
            config.extensions = ext;
            cmd_build(config).await
        }
        Commands::Chat { config, top_k } => {
            let mut config = config.into_config();
            config.top_k = top_k;
            cmd_chat(config).await
        }
        Commands::Query {
            question,
            config,
            top_k,
        } => {
            let mut config = config.into_config();
            config.top_k = top_k;
            cmd_query(config, &question).await
        }
        Commands::Status { config } => cmd_status(config.into_config()).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Build command: index the source directory and persist.
async fn cmd_build(config: RagConfig) -> Result<()> {
    println!(
        "[*] indexing {} -> {}",
        config.source_dir.display(),
        config.storage_dir.display()
    );
    println!(
        "    embedding: {} ({} dims) via {}",
        config.embedding_model, config.embedding_dimension, config.ollama_url
    );

    let embedder = OllamaEmbedding::new(
        &config.ollama_url,
        &config.embedding_model,
        config.embedding_dimension,
    )?;

    let report = build_index(&config, &embedder)
        .await
        .context("index build failed")?;

    println!(
        "[OK] indexed {} documents ({} skipped) into {} chunks",
        report.documents_indexed, report.documents_skipped, report.chunks
    );
    println!("     run `docchat-rag chat` to start asking questions");
    Ok(())
}

/// Chat command: interactive question loop with citations.
///
/// `/clear` resets the conversation history, `/exit` quits. Per-question
/// errors are printed and the loop continues; the loaded index survives
/// backend outages.
async fn cmd_chat(config: RagConfig) -> Result<()> {
    let pipeline = open_pipeline(&config)?;

    println!(
        "[OK] index loaded: {} chunks, model '{}'",
        pipeline.index().len(),
        pipeline.index().embedding_model()
    );
    println!("     ask about your documents (/clear resets history, /exit quits)\n");

    let mut history: Vec<(String, String)> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break, // EOF
        };
        let question = line.trim();

        match question {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                history.clear();
                println!("[OK] history cleared\n");
                continue;
            }
            _ => {}
        }

        match pipeline.ask(question).await {
            Ok(answer) => {
                print_answer(&answer);
                history.push((question.to_string(), answer.text));
                println!("    ({} messages in history)\n", history.len() * 2);
            }
            Err(e) => print_query_error(&e),
        }
    }

    Ok(())
}

/// Query command: one question, one answer.
async fn cmd_query(config: RagConfig, question: &str) -> Result<()> {
    let pipeline = open_pipeline(&config)?;

    println!("[*] asking: \"{}\"", question);
    match pipeline.ask(question).await {
        Ok(answer) => {
            print_answer(&answer);
            Ok(())
        }
        Err(e) => {
            print_query_error(&e);
            Err(e.into())
        }
    }
}

/// Status command: configuration, index and backend health.
async fn cmd_status(config: RagConfig) -> Result<()> {
    println!("docchat-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] source dir:  {}", config.source_dir.display());
    println!("[*] storage dir: {}", config.storage_dir.display());
    println!("[*] ollama url:  {}", config.ollama_url);
    println!(
        "[*] models:      generate={} embed={} ({} dims)",
        config.generation_model, config.embedding_model, config.embedding_dimension
    );

    match VectorIndex::load(&config.storage_dir) {
        Ok(index) => {
            println!(
                "[OK] index: {} chunks, embedding model '{}', built {}",
                index.len(),
                index.embedding_model(),
                index.built_at().format("%Y-%m-%d %H:%M UTC")
            );
            if index.embedding_model() != config.embedding_model {
                println!(
                    "[!] configured embedding model differs from the index; queries will fail until rebuild"
                );
            }
        }
        Err(RagError::IndexNotFound { .. }) => {
            println!("[!] no index yet; run `docchat-rag build`");
        }
        Err(e) => {
            println!("[!] index unreadable: {}", e);
        }
    }

    match ping_backend(&config.ollama_url).await {
        Ok(()) => println!("[OK] ollama reachable"),
        Err(e) => {
            println!("[!] ollama unreachable: {}", e);
            println!("    start it with: ollama serve");
        }
    }

    Ok(())
}

/// Cheap reachability probe against the Ollama daemon.
async fn ping_backend(base_url: &str) -> Result<()> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3))
        .build()?;
    client.get(&url).send().await?.error_for_status()?;
    Ok(())
}

fn open_pipeline(config: &RagConfig) -> Result<QueryPipeline> {
    let embedder = OllamaEmbedding::new(
        &config.ollama_url,
        &config.embedding_model,
        config.embedding_dimension,
    )?;
    let backend = OllamaGenerator::new(
        &config.ollama_url,
        &config.generation_model,
        config.temperature,
        config.context_window,
        config.timeout(),
    )?;

    QueryPipeline::open(config, Box::new(embedder), Box::new(backend))
        .context("failed to open query pipeline")
}

// ============================================================================
// Output Helpers
// ============================================================================

fn print_answer(answer: &Answer) {
    println!("\n{}\n", answer.text.trim());

    if !answer.sources.is_empty() {
        println!("    sources:");
        for (i, citation) in answer.sources.iter().enumerate() {
            println!(
                "    {}. {} (relevance: {})",
                i + 1,
                citation.file_name,
                format_percent(citation.score)
            );
        }
    }
}

fn print_query_error(e: &RagError) {
    match e {
        RagError::GenerationUnavailable { .. } => {
            println!("[!] {}", e);
            println!("    is the daemon running? try: ollama serve\n");
        }
        RagError::GenerationTimeout { .. } => {
            println!("[!] {}", e);
            println!("    try a shorter question or a smaller model\n");
        }
        _ => println!("[!] query failed: {}\n", e),
    }
}

/// Similarity score as a whole percentage.
fn format_percent(score: f32) -> String {
    format!("{:.0}%", score.clamp(0.0, 1.0) * 100.0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.87), "87%");
        assert_eq!(format_percent(1.0), "100%");
        assert_eq!(format_percent(0.0), "0%");
        assert_eq!(format_percent(-0.4), "0%");
        assert_eq!(format_percent(1.5), "100%");
    }

    #[test]
    fn test_config_args_override() {
        let args = ConfigArgs {
            data_dir: PathBuf::from("/docs"),
            storage: Some(PathBuf::from("/store")),
            ollama_url: Some("http://other:11434".to_string()),
            model: Some("mistral".to_string()),
            embed_model: None,
            embed_dim: Some(384),
            timeout: Some(60),
        };

        let config = args.into_config();
        assert_eq!(config.source_dir, PathBuf::from("/docs"));
        assert_eq!(config.storage_dir, PathBuf::from("/store"));
        assert_eq!(config.generation_model, "mistral");
        assert_eq!(config.embedding_dimension, 384);
        assert_eq!(config.timeout_secs, 60);
        // Unset flags keep defaults.
        assert_eq!(config.embedding_model, crate::config::DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn test_cli_parses_build() {
        let cli = Cli::try_parse_from(["docchat-rag", "build", "--data-dir", "./pdfs"]).unwrap();
        match cli.command {
            Commands::Build { config, ext } => {
                assert_eq!(config.data_dir, PathBuf::from("./pdfs"));
                assert_eq!(ext, vec!["pdf".to_string()]);
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_cli_parses_query_with_top_k() {
        let cli =
            Cli::try_parse_from(["docchat-rag", "query", "what is the GPA?", "-k", "5"]).unwrap();
        match cli.command {
            Commands::Query {
                question, top_k, ..
            } => {
                assert_eq!(question, "what is the GPA?");
                assert_eq!(top_k, 5);
            }
            _ => panic!("expected query command"),
        }
    }
}
