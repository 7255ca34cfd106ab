//! # LegaLens CLI (`lens`)
//!
//! The `lens` binary is the primary interface for LegaLens. It provides
//! commands for database initialization, document ingestion, clause risk
//! analysis, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! lens --config ./config/legalens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lens init` | Create the SQLite database and run schema migrations |
//! | `lens ingest <file>` | Segment a document (txt/pdf/docx) and index it |
//! | `lens analyze "<query>"` | Run risk analysis against the indexed document |
//! | `lens serve` | Start the JSON HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use legalens::completion::GeminiClient;
use legalens::config::{load_config, Config};
use legalens::index::{SemanticIndex, SqliteIndex};
use legalens::pipeline::AnalysisPipeline;
use legalens::{db, embedding, ingest, migrate, server};

/// LegaLens — a local-first legal document clause analyzer.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/legalens.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lens",
    about = "LegaLens — a local-first legal document clause analyzer",
    version,
    long_about = "LegaLens splits contracts into clause-level segments, indexes them in SQLite, \
    and answers questions about them by combining LLM risk assessments with a deterministic \
    keyword rule engine."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/legalens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (segments, segment_vectors). Idempotent.
    Init,

    /// Segment a document and index it, replacing any previous document.
    Ingest {
        /// Path to the document (.txt, .pdf, or .docx).
        file: PathBuf,
    },

    /// Analyze the indexed document against a question.
    Analyze {
        /// Plain-language question, e.g. "what are my termination risks?".
        query: String,
    },

    /// Start the JSON HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
        }
        Commands::Ingest { file } => {
            let index = build_index(&config).await?;
            ingest::run_ingest(index, &file).await?;
        }
        Commands::Analyze { query } => {
            let index = build_index(&config).await?;
            let pipeline = build_pipeline(&config, index);
            let report = pipeline.run(&query).await?;
            print_report(&report);
        }
        Commands::Serve => {
            let index = build_index(&config).await?;
            let pipeline = Arc::new(build_pipeline(&config, index.clone()));
            server::run_server(&config, index, pipeline).await?;
        }
    }

    Ok(())
}

async fn build_index(config: &Config) -> anyhow::Result<Arc<dyn SemanticIndex>> {
    let pool = db::connect(&config.db.path).await?;
    let embedder = embedding::create_provider(&config.embedding)?;
    Ok(Arc::new(SqliteIndex::new(
        pool,
        embedder,
        config.embedding.is_enabled(),
    )))
}

fn build_pipeline(config: &Config, index: Arc<dyn SemanticIndex>) -> AnalysisPipeline {
    let completion = Arc::new(GeminiClient::new(&config.completion));
    AnalysisPipeline::new(index, completion, config.retrieval.top_k)
}

fn print_report(report: &legalens::pipeline::AnalysisReport) {
    println!("{}", report.final_answer);

    if let Some(overall) = &report.overall_report {
        println!();
        println!("--- Overall Report ---");
        println!("Overall Risk Score: {}/10", overall.overall_risk_score);
        println!(
            "High: {}  Medium: {}  Low: {}",
            overall.high_risk_count, overall.medium_risk_count, overall.low_risk_count
        );
    }

    if !report.risk_analysis.is_empty() {
        println!();
        println!("--- Clause Analysis ---");
        for assessment in &report.risk_analysis {
            println!(
                "Clause {} [{}] {}/10: {}",
                assessment.clause_id,
                assessment.risk_level,
                assessment.risk_score,
                assessment.reason
            );
            println!("  Recommendation: {}", assessment.recommendation);
        }
    }
}
