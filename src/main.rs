//! # Cairn CLI (`cairn`)
//!
//! The `cairn` binary is the interface to a local-first hybrid retrieval
//! engine: documents go into named scopes, each scope gets a vector index
//! and a knowledge graph, and questions are answered from both.
//!
//! ## Usage
//!
//! ```bash
//! cairn --config ./cairn.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cairn init` | Create the SQLite database and run schema migrations |
//! | `cairn ingest <scope>` | Run the ingestion pipeline over `raw/<scope>/` |
//! | `cairn ask <scope> "<q>"` | Answer a single question against a scope |
//! | `cairn chat <scope>` | Interactive question loop with conversation memory |
//! | `cairn scopes` | List known scopes |
//! | `cairn delete <scope>` | Remove a scope and everything derived from it |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! cairn init --config ./cairn.toml
//!
//! # Drop files into data/raw/hr_docs/ and ingest them
//! cairn ingest hr_docs
//!
//! # Re-run only the graph stage over the existing chunk archive
//! cairn ingest hr_docs --stage graph
//!
//! # One-shot question
//! cairn ask hr_docs "how many vacation days do I get?"
//!
//! # Multi-turn chat
//! cairn chat hr_docs
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cairn::config::{self, Config};
use cairn::ingest::{self, Stage};
use cairn::llm::LlmClient;
use cairn::models::ConversationState;
use cairn::{db, migrate, retrieve, scopes};

/// Cairn — a local-first hybrid retrieval engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `cairn.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cairn",
    about = "Cairn — a local-first hybrid retrieval engine",
    version,
    long_about = "Cairn ingests documents (txt, md, pdf, docx) into named scopes, builds a \
    per-scope vector index and knowledge graph backed by SQLite, and answers questions by \
    fusing vector search, graph lookup, and LLM synthesis via an Ollama-compatible server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./cairn.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (chunks,
    /// chunk_vectors, entities, relations). Idempotent — running it
    /// multiple times is safe.
    Init,

    /// Ingest documents from `raw/<scope>/` into a scope.
    ///
    /// New files are deduplicated against the ingestion ledger, split into
    /// overlapping chunks, embedded into the vector index, and mined for
    /// knowledge-graph triples. Already-ingested files are skipped.
    Ingest {
        /// Scope (collection) name.
        scope: String,

        /// Which stage(s) to run. Partial stages operate on the existing
        /// chunk archive; `all` runs the full pipeline over new files.
        #[arg(long, value_enum, default_value = "all")]
        stage: Stage,
    },

    /// Answer a single question against a scope.
    Ask {
        /// Scope (collection) name.
        scope: String,

        /// The question to answer.
        question: String,
    },

    /// Interactive question loop with conversation memory.
    ///
    /// History accumulates across turns within the session. Type `exit`
    /// or `quit` (or press Ctrl-D) to leave.
    Chat {
        /// Scope (collection) name.
        scope: String,
    },

    /// List known scopes.
    Scopes,

    /// Delete a scope: raw files, ledger entries, chunks, vectors, and
    /// graph edges. Entities still referenced by other scopes survive.
    Delete {
        /// Scope (collection) name.
        scope: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let pool = db::connect(&cfg).await?;
    migrate::run_migrations(&pool).await?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at {}", cfg.db_path().display());
        }
        Commands::Ingest { scope, stage } => {
            std::fs::create_dir_all(cfg.raw_dir(&scope))?;
            let report = ingest::run_ingest(&cfg, &pool, &scope, stage).await?;
            report.print_summary();
        }
        Commands::Ask { scope, question } => {
            let llm = LlmClient::new(&cfg.llm)?;
            let (answer, _) = retrieve::answer_question(
                &cfg,
                &pool,
                &llm,
                &scope,
                &question,
                ConversationState::new(),
            )
            .await?;
            println!("{answer}");
        }
        Commands::Chat { scope } => {
            run_chat(&cfg, &pool, &scope).await?;
        }
        Commands::Scopes => {
            let names = scopes::list_scopes(&cfg)?;
            if names.is_empty() {
                println!("No scopes yet. Create one with: cairn ingest <scope>");
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
        Commands::Delete { scope } => {
            let deletion = scopes::delete_scope(&cfg, &pool, &scope).await?;
            println!(
                "Deleted scope '{}': {} ledger entries, {} chunks, {} vectors.",
                scope, deletion.ledger_entries, deletion.chunks, deletion.vectors
            );
        }
    }

    Ok(())
}

/// Line-oriented chat loop. History lives for the session and belongs to
/// one scope; a new invocation (or a different scope) starts fresh.
async fn run_chat(cfg: &Config, pool: &sqlx::SqlitePool, scope: &str) -> anyhow::Result<()> {
    let llm = LlmClient::new(&cfg.llm)?;
    let mut history = ConversationState::new();

    println!("Chatting with scope '{scope}'. Type 'exit' to leave.");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        let (answer, updated) =
            retrieve::answer_question(cfg, pool, &llm, scope, question, history).await?;
        println!("{answer}\n");
        history = updated;
    }

    Ok(())
}
