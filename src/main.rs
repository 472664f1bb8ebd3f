//! # Connie CLI (`connie`)
//!
//! The `connie` binary ingests documents into the vector index, runs the
//! HTTP chat service, and offers a few index maintenance commands.
//!
//! ## Usage
//!
//! ```bash
//! connie --config ./config/connie.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `connie serve` | Start the HTTP server (`/chat`, `/query`, `/health`) |
//! | `connie ingest pdfs` | Index new or changed documents under `ingest.docs_dir` |
//! | `connie ingest csv <path>` | Index a filtered conversation CSV |
//! | `connie ask "<question>"` | Run one support turn and print the reply |
//! | `connie namespaces` | Show index stats per namespace |
//! | `connie inspect <ns>` | Preview stored chunks of a namespace |
//! | `connie delete-namespace <ns>` | Delete every vector in a namespace |
//!
//! ## Examples
//!
//! ```bash
//! # Index PDFs, skipping anything already uploaded
//! connie ingest pdfs --config ./config/connie.toml
//!
//! # See what a full re-run would upload
//! connie ingest pdfs --full --dry-run
//!
//! # Ask the support assistant from the terminal
//! connie ask "How do I register as a freelancer?"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use connie_rag::admin;
use connie_rag::config;
use connie_rag::ingest::{IngestOptions, Ingestor};
use connie_rag::logging;
use connie_rag::server;
use connie_rag::services::Services;
use connie_rag::session::DEFAULT_SESSION;
use connie_rag::support::SupportAssistant;

/// Connie: duplicate-aware document ingestion and a guarded RAG chat service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/connie.example.toml` for a full example. API keys are
/// read from `OPENAI_API_KEY` and `PINECONE_API_KEY`.
#[derive(Parser)]
#[command(
    name = "connie",
    about = "Connie: duplicate-aware ingestion and a guarded conversational RAG service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/connie.toml`. Built-in defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/connie.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves the companion (`POST /chat`) and
    /// the support assistant (`POST /query`).
    Serve,

    /// Ingest documents into the vector index.
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Ask the support assistant one question.
    Ask {
        /// The question.
        question: String,

        /// Session id, for follow-up context within one process.
        #[arg(long)]
        session: Option<String>,
    },

    /// Show index statistics and namespaces.
    Namespaces,

    /// Preview chunks stored in a namespace.
    Inspect {
        /// Namespace to inspect.
        namespace: String,

        /// Number of chunks to show.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Delete every vector in a namespace.
    DeleteNamespace {
        /// Namespace to delete.
        namespace: String,

        /// Skip the interactive confirmation.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum IngestSource {
    /// Documents under `[ingest].docs_dir` matching the include globs.
    ///
    /// Files whose content hash is already logged, or already present in
    /// the index, are skipped.
    Pdfs {
        /// Ignore the ingest log (the index existence check still applies).
        #[arg(long)]
        full: bool,

        /// Skip the index existence check too; re-upload everything.
        #[arg(long)]
        force: bool,

        /// Show counts without uploading or writing the JSON maps.
        #[arg(long)]
        dry_run: bool,
    },

    /// A conversation CSV, filtered and split into short chunks.
    Csv {
        /// Path to the CSV file.
        path: PathBuf,

        /// Show counts without uploading or writing the ingest log.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { source } => {
            let (embedder, index) = Services::index_only(&cfg)?;
            let ingestor = Ingestor::new(embedder.as_ref(), index.as_ref(), &cfg);
            match source {
                IngestSource::Pdfs {
                    full,
                    force,
                    dry_run,
                } => {
                    let options = IngestOptions {
                        full,
                        force,
                        dry_run,
                    };
                    let report = ingestor.ingest_documents(options).await?;
                    report.print("pdfs", dry_run);
                }
                IngestSource::Csv { path, dry_run } => {
                    let options = IngestOptions {
                        dry_run,
                        ..Default::default()
                    };
                    let report = ingestor.ingest_csv(&path, options).await?;
                    report.print(&format!("csv {}", path.display()), dry_run);
                }
            }
        }
        Commands::Ask { question, session } => {
            let services = Services::from_config(&cfg)?;
            let assistant = SupportAssistant::new(&services, cfg.support.clone(), cfg.router.clone());
            let session = session.unwrap_or_else(|| DEFAULT_SESSION.to_string());
            let outcome = assistant.answer(&question, &session).await;
            println!("{}", outcome.reply);
            if let Some(kind) = outcome.error {
                anyhow::bail!("support pipeline failed: {}", kind);
            }
        }
        Commands::Namespaces => {
            let index = connie_rag::index::create_index(&cfg.index)?;
            admin::run_namespaces(index.as_ref()).await?;
        }
        Commands::Inspect { namespace, limit } => {
            let index = connie_rag::index::create_index(&cfg.index)?;
            admin::run_inspect(index.as_ref(), cfg.index.dimension, &namespace, limit).await?;
        }
        Commands::DeleteNamespace { namespace, yes } => {
            let index = connie_rag::index::create_index(&cfg.index)?;
            admin::run_delete_namespace(index.as_ref(), &namespace, yes).await?;
        }
    }

    Ok(())
}
