//! bucketdb CLI
//!
//! Command-line access to a file-backed bucketdb store.
//!
//! # Commands
//!
//! - `insert` - Create an entity from core, bucket and index assignments
//! - `get` - Print one entity
//! - `find` - Look entities up by index value
//! - `remove` - Delete an entity
//! - `inspect` - Count the documents in the store by kind

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// bucketdb command-line tools.
#[derive(Parser)]
#[command(name = "bucketdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON store file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Collection prefix
    #[arg(global = true, long, default_value = "entities")]
    prefix: String,

    /// Id strategy for new entities
    #[arg(global = true, long, value_enum, default_value_t = IdStrategy::Date)]
    ids: IdStrategy,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// How `insert` generates entity ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdStrategy {
    /// `<millis>-<counter>`
    Date,
    /// Time-ordered UUIDs
    Uuid,
    /// Zero-padded counter stored in the settings of the store
    Auto,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an entity
    Insert {
        /// Core attribute, `key=value` (repeatable)
        #[arg(short, long = "core")]
        core: Vec<String>,

        /// Bucket attribute, `group.key=value` (repeatable)
        #[arg(short, long = "bucket")]
        bucket: Vec<String>,

        /// Index value, `name=value` (repeatable)
        #[arg(short, long = "index")]
        index: Vec<String>,
    },

    /// Print an entity
    Get {
        /// Entity id
        id: String,
    },

    /// Find entities by index value
    Find {
        /// Index name
        name: String,

        /// Value to match
        value: String,

        /// Match values starting with `value`
        #[arg(short, long)]
        starts_with: bool,

        /// Match values greater than or equal to `value`
        #[arg(short, long)]
        gte: bool,

        /// Return matches in descending order
        #[arg(short, long)]
        descending: bool,

        /// Maximum number of index rows to scan
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete an entity
    Remove {
        /// Entity id
        id: String,
    },

    /// Count documents by kind
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays valid JSON.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Insert { core, bucket, index } => {
            let path = cli.path.ok_or(commands::CliError::MissingPath("insert"))?;
            let store = commands::open_store(&path, &cli.prefix, cli.ids)?;
            commands::insert::run(&store, &core, &bucket, &index).await?;
        }
        Commands::Get { id } => {
            let path = cli.path.ok_or(commands::CliError::MissingPath("get"))?;
            let store = commands::open_store(&path, &cli.prefix, cli.ids)?;
            commands::get::run(&store, &id).await?;
        }
        Commands::Find {
            name,
            value,
            starts_with,
            gte,
            descending,
            limit,
        } => {
            let path = cli.path.ok_or(commands::CliError::MissingPath("find"))?;
            let store = commands::open_store(&path, &cli.prefix, cli.ids)?;
            let options = bucketdb_core::FindOptions::new()
                .starts_with(starts_with)
                .gte(gte)
                .descending(descending)
                .limit(limit);
            commands::find::run(&store, &name, &value, options).await?;
        }
        Commands::Remove { id } => {
            let path = cli.path.ok_or(commands::CliError::MissingPath("remove"))?;
            let store = commands::open_store(&path, &cli.prefix, cli.ids)?;
            commands::remove::run(&store, &id).await?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or(commands::CliError::MissingPath("inspect"))?;
            commands::inspect::run(&path, &cli.prefix, &format)?;
        }
        Commands::Version => {
            println!("bucketdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("bucketdb Core v{}", bucketdb_core::VERSION);
        }
    }

    Ok(())
}
