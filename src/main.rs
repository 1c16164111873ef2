//! rustarxiv - arXiv paper enrichment pipeline
//!
//! Resolves the LaTeX sources of arXiv papers and derives affiliations,
//! a relevance score, a TLDR and a topic with an OpenAI-compatible LLM.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! rustarxiv enrich 2401.00001 2401.00002
//! rustarxiv enrich --query "cat:cs.CL" --max-results 20
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustarxiv serve --port 3000
//! ```

use anyhow::{bail, Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rustarxiv::{
    arxiv::{ArxivClient, ArxivRecord},
    digest::{self, DigestDeps, DigestEntry, DigestOptions, DEFAULT_CONCURRENCY},
    llm::{LlmClient, LlmConfig, DEFAULT_MAX_RETRIES},
    repository::PapersWithCodeClient,
    DigestError,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Default number of records for a search query
const DEFAULT_MAX_RESULTS: usize = 20;

// ============================================================================
// CLI Definition
// ============================================================================

/// arXiv paper enrichment pipeline
#[derive(Parser)]
#[command(name = "rustarxiv")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich papers and write digest.json / digest.csv
    Enrich {
        /// arXiv identifiers, e.g. 2401.00001
        #[arg(required_unless_present = "query")]
        ids: Vec<String>,

        /// arXiv search expression, e.g. "cat:cs.CL"
        #[arg(long, conflicts_with = "ids")]
        query: Option<String>,

        /// Maximum number of records for --query
        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max_results: usize,

        #[command(flatten)]
        llm: LlmArgs,

        /// Papers enriched concurrently
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Skip the paperswithcode repository lookup
        #[arg(long)]
        no_code_lookup: bool,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[command(flatten)]
        llm: LlmArgs,

        /// Papers enriched concurrently per request
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },
}

/// LLM backend settings
#[derive(Args, Clone)]
struct LlmArgs {
    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.openai.com")]
    llm_base_url: String,

    /// API key for the LLM backend
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_key: String,

    /// Model name
    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o")]
    llm_model: String,

    /// Attempts per request when rate limited
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    llm_max_retries: u32,
}

impl LlmArgs {
    fn build_client(&self) -> Result<LlmClient> {
        let mut config = LlmConfig::new(&self.llm_base_url, &self.llm_key, &self.llm_model);
        config.max_retries = self.llm_max_retries;
        LlmClient::new(config).context("Invalid LLM configuration")
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    match cli.command {
        Commands::Enrich {
            ids,
            query,
            max_results,
            llm,
            concurrency,
            no_code_lookup,
            output,
        } => {
            let options = DigestOptions {
                concurrency,
                lookup_code: !no_code_lookup,
            };
            run_enrich(ids, query, max_results, &llm, options, output).await
        }
        Commands::Serve {
            port,
            host,
            llm,
            concurrency,
        } => run_server(host, port, &llm, concurrency).await,
    }
}

// ============================================================================
// Enrich Pipeline
// ============================================================================

async fn fetch_records(
    arxiv: &ArxivClient,
    ids: &[String],
    query: Option<&str>,
    max_results: usize,
) -> rustarxiv::Result<Vec<ArxivRecord>> {
    match query {
        Some(query) => arxiv.search(query, max_results).await,
        None => arxiv.fetch_by_ids(ids).await,
    }
}

async fn run_enrich(
    ids: Vec<String>,
    query: Option<String>,
    max_results: usize,
    llm: &LlmArgs,
    options: DigestOptions,
    output_dir: PathBuf,
) -> Result<()> {
    if ids.is_empty() && query.is_none() {
        bail!("Provide arXiv ids or --query");
    }

    // Create timestamped output folder
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let output_folder = output_dir.join(format!("digest_{}", timestamp));
    std::fs::create_dir_all(&output_folder).context("Failed to create output directory")?;
    println!("Output folder: {}", output_folder.display());

    let arxiv = ArxivClient::new().context("Failed to create arXiv client")?;
    let backend = llm.build_client()?;
    let code = PapersWithCodeClient::new().context("Failed to create paperswithcode client")?;

    println!("\n--- Stage 1: arXiv Metadata ---");
    let records = fetch_records(&arxiv, &ids, query.as_deref(), max_results)
        .await
        .context("arXiv query failed")?;
    if records.is_empty() {
        println!("No papers found.");
        return Ok(());
    }
    println!("Found {} papers.", records.len());

    println!(
        "\n--- Stage 2: Source Resolution & LLM Extraction ({} workers, model {}) ---",
        options.concurrency,
        backend.model()
    );
    let deps = DigestDeps {
        fetcher: &arxiv,
        backend: &backend,
        lookup: &code,
    };
    let entries = digest::enrich_papers(records, deps, &options).await;

    println!("\n--- Stage 3: Output ---");
    save_json(&output_folder.join("digest.json"), &entries)?;
    save_csv(&output_folder.join("digest.csv"), &entries)?;

    println!("\nDone. {} papers enriched.", entries.len());
    Ok(())
}

/// Save data to JSON file
fn save_json<T: Serialize>(path: &Path, data: &[T]) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize JSON")?;
    std::fs::write(path, json).context("Failed to write JSON")?;
    println!("Saved: {:?}", path);
    Ok(())
}

/// Save data to CSV file
fn save_csv<T: Serialize>(path: &Path, data: &[T]) -> Result<()> {
    if data.is_empty() {
        println!("No data to save to {:?}", path);
        return Ok(());
    }

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context("Failed to create CSV writer")?;

    for item in data {
        wtr.serialize(item).context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    println!("Saved: {:?}", path);
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

struct AppState {
    arxiv: ArxivClient,
    backend: LlmClient,
    code: PapersWithCodeClient,
    concurrency: usize,
}

async fn run_server(host: String, port: u16, llm: &LlmArgs, concurrency: usize) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let app_state = Arc::new(AppState {
        arxiv: ArxivClient::new().context("Failed to create arXiv client")?,
        backend: llm.build_client()?,
        code: PapersWithCodeClient::new().context("Failed to create paperswithcode client")?,
        concurrency,
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/enrich", post(enrich_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Enrich request body; `query` wins over `ids`
#[derive(Debug, Deserialize)]
struct EnrichRequest {
    #[serde(default)]
    ids: Vec<String>,
    query: Option<String>,
    #[serde(default = "default_max_results")]
    max_results: usize,
    #[serde(default = "default_lookup_code")]
    lookup_code: bool,
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_lookup_code() -> bool {
    true
}

/// Enrich response
#[derive(Debug, Serialize)]
struct EnrichResponse {
    status: String,
    count: usize,
    results: Vec<DigestEntry>,
}

impl EnrichResponse {
    fn failure(status: StatusCode, message: String) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                status: format!("error: {}", message),
                count: 0,
                results: vec![],
            }),
        )
    }
}

/// Bad input is the caller's fault; anything else is an upstream failure
fn query_error_status(error: &DigestError) -> StatusCode {
    match error {
        DigestError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Enrich endpoint handler
async fn enrich_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EnrichRequest>,
) -> (StatusCode, Json<EnrichResponse>) {
    info!(ids = ?req.ids, query = ?req.query, "Enrich request");

    if req.ids.is_empty() && req.query.is_none() {
        return EnrichResponse::failure(
            StatusCode::BAD_REQUEST,
            "provide ids or query".to_string(),
        );
    }

    let records =
        match fetch_records(&state.arxiv, &req.ids, req.query.as_deref(), req.max_results).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "arXiv query failed");
                return EnrichResponse::failure(query_error_status(&e), e.to_string());
            }
        };

    let options = DigestOptions {
        concurrency: state.concurrency,
        lookup_code: req.lookup_code,
    };
    let deps = DigestDeps {
        fetcher: &state.arxiv,
        backend: &state.backend,
        lookup: &state.code,
    };
    let results = digest::enrich_papers(records, deps, &options).await;

    (
        StatusCode::OK,
        Json(EnrichResponse {
            status: "success".to_string(),
            count: results.len(),
            results,
        }),
    )
}
