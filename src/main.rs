//! # docqa CLI
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and run schema migrations |
//! | `docqa ingest <pdf>` | Extract, chunk, and index a PDF |
//! | `docqa documents` | List uploaded documents |
//! | `docqa sessions create --name <n> --doc <id>...` | Create a chat session |
//! | `docqa sessions list` | List chat sessions |
//! | `docqa ask <session-id> "<question>"` | Ask a question against a session |
//! | `docqa serve` | Start the HTTP API |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docqa::config;
use docqa::context::AppContext;
use docqa::qa::{answer_question, Answer};
use docqa::{db, ingest, migrate, server};
use docqa_core::models::OwningEntity;

/// Retrieval-augmented question answering over PDF documents.
#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Upload a PDF from disk: extract, chunk, embed, and index it.
    Ingest {
        /// Path to the PDF file.
        path: PathBuf,

        /// Associate the document with an existing topic.
        #[arg(long)]
        topic_id: Option<i64>,
    },

    /// List uploaded documents.
    Documents {
        #[arg(long)]
        topic_id: Option<i64>,
    },

    /// Manage chat sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Ask a question against a chat session.
    ///
    /// Requires the language-model API key named by `[llm].api_key_env`.
    Ask {
        session_id: i64,
        question: String,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a session over one or more documents.
    Create {
        #[arg(long)]
        name: String,

        /// Document id; repeat for several documents.
        #[arg(long = "doc", required = true)]
        documents: Vec<i64>,
    },
    /// List sessions, newest first.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, topic_id } => {
            let ctx = AppContext::without_llm(&cfg).await?;
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let doc = ingest::ingest_pdf(&ctx, &filename, &bytes, topic_id).await?;
            println!(
                "Ingested {} as document {} ({} chunks, {})",
                doc.filename, doc.id, doc.chunk_count, doc.index_status
            );
        }
        Commands::Documents { topic_id } => {
            let ctx = AppContext::without_llm(&cfg).await?;
            let docs = ctx.registry.list_documents(topic_id).await?;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                println!(
                    "{:>5}  {:<40}  {:>4} chunks  {:<9}  {}",
                    doc.id, doc.filename, doc.chunk_count, doc.index_status, doc.upload_date
                );
            }
        }
        Commands::Sessions { action } => {
            let ctx = AppContext::without_llm(&cfg).await?;
            match action {
                SessionAction::Create { name, documents } => {
                    let session = ingest::create_session(&ctx, &name, &documents).await?;
                    println!(
                        "Created session {} '{}' over {} documents ({})",
                        session.id, session.name, session.document_count, session.index_status
                    );
                }
                SessionAction::List => {
                    let sessions = ctx.registry.list_sessions().await?;
                    if sessions.is_empty() {
                        println!("No sessions.");
                    }
                    for s in sessions {
                        println!(
                            "{:>5}  {:<30}  {:>3} docs  {:<9}  {}",
                            s.id, s.name, s.document_count, s.index_status, s.created_date
                        );
                    }
                }
            }
        }
        Commands::Ask {
            session_id,
            question,
        } => {
            let ctx = AppContext::from_config(&cfg).await?;
            let outcome =
                answer_question(&ctx, OwningEntity::Session(session_id), &question).await?;
            println!("{}", outcome.answer.text());
            if let Answer::Grounded { sources, .. } = &outcome.answer {
                println!();
                for (i, s) in sources.iter().enumerate() {
                    println!(
                        "[{}] document {} chunk {} (score {:.3})",
                        i + 1,
                        s.document_id,
                        s.chunk_index,
                        s.score
                    );
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
