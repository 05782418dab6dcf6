use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use searchlink::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::DocumentSource;

#[derive(Parser, Debug)]
#[command(name = "searchlink")]
#[command(about = "Searchlink CLI - bulk indexing, scroll export and reindexing")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "SEARCHLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Connection settings that override the config file
#[derive(Args, Debug, Default)]
struct ConnectionArgs {
    /// Cluster node URL (repeatable, replaces the configured hosts)
    #[arg(long = "host", global = true)]
    hosts: Vec<String>,

    /// User for basic auth
    #[arg(short, long, global = true, env = "SEARCHLINK_USERNAME")]
    username: Option<String>,

    /// Password for basic auth
    #[arg(long, global = true, env = "SEARCHLINK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Encoded API key, used instead of basic auth
    #[arg(long, global = true, env = "SEARCHLINK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index JSONL documents (one action per line)
    Bulk {
        /// Input file, stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Default index for documents without `_index`
        #[arg(long)]
        index: Option<String>,

        /// Actions per request
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Retries for documents rejected with 429
        #[arg(long)]
        max_retries: Option<u32>,

        /// Report counts only, not the failed documents
        #[arg(long)]
        stats_only: bool,
    },

    /// Export every hit of a query as JSONL on stdout
    Scan {
        /// Index name or pattern
        index: String,

        /// Search body as JSON, e.g. '{"query":{"match_all":{}}}'
        #[arg(short, long)]
        query: Option<String>,

        /// Hits per page
        #[arg(long)]
        size: Option<usize>,

        /// Keep the query's sort order (slower)
        #[arg(long)]
        preserve_order: bool,
    },

    /// Copy documents from one index to another
    Reindex {
        /// Source index
        source: String,

        /// Target index
        target: String,

        /// Search body selecting the documents to copy
        #[arg(short, long)]
        query: Option<String>,

        /// Node URL of a different target cluster (repeatable)
        #[arg(long = "target-host")]
        target_hosts: Vec<String>,

        /// Operation to write with: index or create
        #[arg(long)]
        op_type: Option<String>,

        /// Actions per bulk request
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

/// Load the config file (if any) and apply command line overrides
fn load_config(path: Option<&PathBuf>, connection: ConnectionArgs) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if !connection.hosts.is_empty() {
        config.client.hosts = connection.hosts;
    }
    if connection.api_key.is_some() {
        config.client.api_key = connection.api_key;
        config.client.username = None;
        config.client.password = None;
    }
    if connection.username.is_some() {
        config.client.username = connection.username;
        config.client.password = connection.password;
        config.client.api_key = None;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref(), cli.connection)?;

    match cli.command {
        Commands::Bulk {
            input,
            index,
            chunk_size,
            max_retries,
            stats_only,
        } => {
            let source = match input {
                Some(path) => DocumentSource::FromFile(path),
                None => DocumentSource::FromStdin,
            };
            let mut options = config.bulk.to_options();
            options.index = index;
            if let Some(size) = chunk_size {
                options.chunk_size = size;
            }
            if let Some(retries) = max_retries {
                options.max_retries = retries;
            }
            commands::run_bulk(&config, source, options, stats_only).await?;
        }
        Commands::Scan {
            index,
            query,
            size,
            preserve_order,
        } => {
            let mut options = config.scan.to_options(index);
            options.query = commands::parse_query(query.as_deref())?;
            if let Some(size) = size {
                options.size = size;
            }
            options.preserve_order |= preserve_order;
            commands::run_scan(&config, options).await?;
        }
        Commands::Reindex {
            source,
            target,
            query,
            target_hosts,
            op_type,
            chunk_size,
        } => {
            let query = commands::parse_query(query.as_deref())?;
            let op_type = op_type
                .map(|op| op.parse::<searchlink::OpType>())
                .transpose()?;
            let mut bulk = config.bulk.to_options();
            if let Some(size) = chunk_size {
                bulk.chunk_size = size;
            }
            commands::run_reindex(
                &config,
                &source,
                &target,
                query,
                target_hosts,
                op_type,
                bulk,
            )
            .await?;
        }
    }

    Ok(())
}
