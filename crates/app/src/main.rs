use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use legal_rag_core::config::{API_KEY_ENV, DEFAULT_INDEX_DIR, DEFAULT_MODEL, DEFAULT_MODEL_ENDPOINT};
use legal_rag_core::{
    discover_pdf_files, GroqChatModel, HashingEncoder, LegalRetriever, ModelConfig, QueryError,
    RetrievalResult, RetrieverConfig, RetryPolicy, SearchOptions, SourceCitation,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "legal-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the persisted index.
    #[arg(long, env = "LEGAL_RAG_INDEX_DIR", default_value = DEFAULT_INDEX_DIR, global = true)]
    index_dir: PathBuf,

    /// Chat model used to write answers.
    #[arg(long, env = "LEGAL_RAG_MODEL", default_value = DEFAULT_MODEL, global = true)]
    model: String,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, env = "LEGAL_RAG_ENDPOINT", default_value = DEFAULT_MODEL_ENDPOINT, global = true)]
    endpoint: String,

    /// API key for the chat model.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Per-request timeout for the chat model.
    #[arg(long, default_value = "60", global = true)]
    timeout_secs: u64,

    /// Attempts per answer, including the first.
    #[arg(long, default_value = "3", global = true)]
    max_attempts: usize,

    /// Number of passages handed to the model.
    #[arg(long, default_value = "5", global = true)]
    top_k: usize,

    /// Relevance/diversity trade-off in [0, 1]; 1.0 ranks by relevance only.
    #[arg(long, default_value = "0.5", value_parser = parse_lambda, global = true)]
    lambda: f32,

    /// Candidates considered before diversification.
    #[arg(long, default_value = "20", global = true)]
    fetch_k: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and index legal PDFs, replacing the current index.
    Ingest {
        /// Folder searched recursively for PDFs.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        folder: Option<PathBuf>,
        /// One or more PDF files.
        #[arg(long, num_args = 1..)]
        file: Vec<PathBuf>,
    },
    /// Ask a question and print the answer with its sources.
    Ask {
        #[arg(long)]
        question: String,
        /// Print the result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show what is currently indexed.
    Status,
}

fn parse_lambda(raw: &str) -> Result<f32, String> {
    let lambda: f32 = raw
        .trim()
        .parse()
        .map_err(|error| format!("`{raw}` is not a number: {error}"))?;
    if !lambda.is_finite() || !(0.0..=1.0).contains(&lambda) {
        return Err(format!("`{raw}` must be a finite value between 0 and 1"));
    }
    Ok(lambda)
}

impl Cli {
    fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig {
            search: SearchOptions {
                top_k: self.top_k,
                diversify: true,
                lambda: self.lambda,
                fetch_k: self.fetch_k.max(self.top_k),
            },
            ..RetrieverConfig::with_index_dir(&self.index_dir)
        }
    }

    fn model_config(&self) -> ModelConfig {
        ModelConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                ..RetryPolicy::default()
            },
            ..ModelConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        index_dir = %cli.index_dir.display(),
        "legal-rag boot"
    );

    let model = GroqChatModel::new(cli.model_config()).context("invalid model configuration")?;
    let retriever = LegalRetriever::open(
        cli.retriever_config(),
        Arc::new(HashingEncoder::default()),
        Arc::new(model),
    );

    match cli.command {
        Command::Ingest { folder, file } => {
            let paths = match (folder, file) {
                (Some(folder), _) => {
                    let files = discover_pdf_files(&folder);
                    if files.is_empty() {
                        bail!("no PDF files found under {}", folder.display());
                    }
                    files
                }
                (None, files) if !files.is_empty() => files,
                (None, _) => bail!("pass --folder or --file"),
            };

            let (report, summary) = retriever
                .ingest_and_index(paths)
                .await
                .context("indexing failed")?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            println!(
                "{} chunks from {} document(s) indexed at {} ({} skipped)",
                summary.chunk_count,
                summary.document_count,
                summary.location.display(),
                report.skipped_files.len()
            );
        }
        Command::Ask { question, json } => {
            let started = Instant::now();
            match retriever.query(&question).await {
                Ok(result) => {
                    let elapsed = started.elapsed();
                    if json {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    } else {
                        print_result(&result, elapsed);
                    }
                }
                Err(error @ QueryError::Synthesis { .. }) => {
                    if !error.sources().is_empty() {
                        println!("Retrieved sources:");
                        print_sources(error.sources());
                    }
                    return Err(error.into());
                }
                Err(error) => return Err(error.into()),
            }
        }
        Command::Status => match retriever.index_summary().await {
            Some(summary) => {
                println!("index: {}", summary.location.display());
                println!("chunks: {}", summary.chunk_count);
                println!("documents: {}", summary.document_count);
                println!("encoder: {}", summary.manifest.encoder_model);
                println!("built_at: {}", summary.manifest.built_at.to_rfc3339());
                println!("build_id: {}", summary.manifest.build_id);
            }
            None => println!("no index at {}; run `legal-rag ingest` first", cli.index_dir.display()),
        },
    }

    Ok(())
}

fn print_result(result: &RetrievalResult, elapsed: Duration) {
    println!("{}", result.answer);
    println!();
    println!("Answered in {:.2}s", elapsed.as_secs_f64());
    if !result.sources.is_empty() {
        println!("Sources:");
        print_sources(&result.sources);
    }
}

fn print_sources(sources: &[SourceCitation]) {
    for (position, source) in sources.iter().enumerate() {
        println!("{}. {} (page {})", position + 1, source.document, source.page);
        println!("   {}", source.content);
    }
}
