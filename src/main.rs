//! # Support Harness CLI (`support`)
//!
//! ## Usage
//!
//! ```bash
//! support --config ./config/support.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `support init` | Create the SQLite database and run schema migrations |
//! | `support ingest <file>` | Chunk, embed, and store one text file |
//! | `support ingest-dir <dir>` | Ingest every matching file under a directory |
//! | `support import-tickets <file>` | Convert a JSON ticket export and ingest it |
//! | `support ask "<question>"` | Run one chat turn |
//! | `support documents` | List indexed documents |
//! | `support delete-document --title <title>` | Remove a document's chunks |
//! | `support delete-chunk <id>` | Remove one chunk |
//! | `support conversation <id>` | Print a stored conversation |
//! | `support feedback <id> --rating <n>` | Rate a conversation |
//! | `support stats` | Index and conversation overview |
//! | `support serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! support init
//! support ingest-dir ./docs --product-version 2.1
//! support import-tickets ./export.json --data-type zendesk
//! support ask "How do I reset my password?" --user alice
//! support serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use support_harness::config::{self, Config};
use support_harness::ingest::FileOptions;
use support_harness::tickets::TicketFormat;
use support_harness::{chat_cmd, documents, ingest, logging, migrate, server, stats};
use support_harness_core::models::{ChatRequest, FeedbackRequest, SourceType};

/// Support Harness CLI: retrieval-augmented answers over your product
/// documentation and past support tickets.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/support.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "support",
    about = "Support Harness: grounded support answers over documents and tickets",
    version,
    long_about = "Support Harness chunks and embeds product documentation and support tickets, \
    retrieves the most similar passages for a question, and answers with cited sources. \
    Conversations and feedback are kept in SQLite."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/support.toml`.
    #[arg(long, global = true, default_value = "./config/support.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it again leaves existing data untouched.
    Init,

    /// Ingest one UTF-8 text file.
    Ingest {
        /// File to ingest.
        path: PathBuf,

        /// Document title. Defaults to the file name.
        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        options: FileArgs,
    },

    /// Ingest every matching file under a directory.
    ///
    /// Titles are paths relative to the directory. `.git`, `target`, and
    /// `node_modules` are always skipped.
    IngestDir {
        dir: PathBuf,

        /// Glob patterns to include. Defaults to `**/*.md` and `**/*.txt`.
        #[arg(long = "include")]
        include: Vec<String>,

        #[command(flatten)]
        options: FileArgs,
    },

    /// Import a JSON ticket export (an array of records or a single record).
    ImportTickets {
        path: PathBuf,

        /// Export flavour.
        #[arg(long, value_enum, default_value = "helpdesk")]
        data_type: TicketFormat,

        #[arg(long)]
        product_version: Option<String>,

        /// Delete each ticket's existing chunks before writing.
        #[arg(long)]
        replace: bool,
    },

    /// Ask a question and print the answer with its sources.
    Ask {
        query: String,

        #[arg(long, default_value = "cli")]
        user: String,

        #[arg(long)]
        product_version: Option<String>,

        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<String>,

        /// Restrict retrieval to these chunk ids (repeatable).
        #[arg(long = "doc")]
        docs: Vec<String>,
    },

    /// List indexed documents.
    Documents {
        #[arg(long)]
        product_version: Option<String>,
    },

    /// Delete every chunk of a document.
    DeleteDocument {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "txt")]
        source_type: SourceType,
    },

    /// Delete one chunk by id.
    DeleteChunk { id: String },

    /// Print a conversation and its messages.
    Conversation { id: String },

    /// Rate a conversation from 1 to 5.
    Feedback {
        conversation_id: String,

        #[arg(long)]
        rating: u8,

        #[arg(long, default_value = "cli")]
        user: String,

        #[arg(long)]
        text: Option<String>,
    },

    /// Show index and conversation statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

/// Metadata flags shared by `ingest` and `ingest-dir`.
#[derive(clap::Args)]
struct FileArgs {
    /// Override the source type inferred from the file extension.
    #[arg(long)]
    source_type: Option<SourceType>,

    #[arg(long)]
    product_version: Option<String>,

    /// Tag to attach (repeatable).
    #[arg(long = "tag")]
    tags: Vec<String>,

    #[arg(long)]
    section: Option<String>,

    /// Delete the document's existing chunks before writing.
    #[arg(long)]
    replace: bool,
}

impl From<FileArgs> for FileOptions {
    fn from(args: FileArgs) -> Self {
        FileOptions {
            source_type: args.source_type,
            product_version: args.product_version,
            tags: args.tags,
            section: args.section,
            replace: args.replace,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg: Config = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest {
            path,
            title,
            options,
        } => {
            ingest::run_ingest_file(&cfg, &path, title, options.into()).await?;
        }
        Commands::IngestDir {
            dir,
            include,
            options,
        } => {
            ingest::run_ingest_dir(&cfg, &dir, include, options.into()).await?;
        }
        Commands::ImportTickets {
            path,
            data_type,
            product_version,
            replace,
        } => {
            ingest::run_import_tickets(&cfg, &path, data_type, product_version, replace).await?;
        }
        Commands::Ask {
            query,
            user,
            product_version,
            conversation,
            docs,
        } => {
            let request = ChatRequest {
                user_id: user,
                query,
                product_version,
                conversation_id: conversation,
                document_ids: if docs.is_empty() { None } else { Some(docs) },
            };
            chat_cmd::run_ask(&cfg, request).await?;
        }
        Commands::Documents { product_version } => {
            documents::run_documents(&cfg, product_version.as_deref()).await?;
        }
        Commands::DeleteDocument { title, source_type } => {
            documents::run_delete_document(&cfg, &title, source_type).await?;
        }
        Commands::DeleteChunk { id } => {
            documents::run_delete_chunk(&cfg, &id).await?;
        }
        Commands::Conversation { id } => {
            chat_cmd::run_conversation(&cfg, &id).await?;
        }
        Commands::Feedback {
            conversation_id,
            rating,
            user,
            text,
        } => {
            let request = FeedbackRequest {
                conversation_id,
                user_id: user,
                rating,
                feedback_text: text,
            };
            chat_cmd::run_feedback(&cfg, request).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
