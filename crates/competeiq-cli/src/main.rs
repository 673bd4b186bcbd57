mod check;
mod client;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::client::ApiClient;

#[derive(Debug, Parser)]
#[command(name = "competeiq-cli")]
#[command(about = "CompeteIQ command line interface")]
struct Cli {
    /// Base URL of a running competeiq-server
    #[arg(
        long,
        global = true,
        env = "COMPETEIQ_API_URL",
        default_value = "http://localhost:3000"
    )]
    api_url: String,

    /// Bearer token sent with every API request
    #[arg(long, global = true, env = "COMPETEIQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate environment configuration and the watchlist file
    CheckConfig {
        /// Watchlist to validate instead of `COMPETEIQ_WATCHLIST_PATH`
        #[arg(long)]
        watchlist: Option<PathBuf>,
    },
    /// Push a JSON array of articles for one source
    Ingest {
        /// Source id the articles belong to
        #[arg(long)]
        source: String,
        /// File containing `[{title, content, url, date}]`
        file: PathBuf,
    },
    /// Semantic search over ingested documents
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum cosine similarity in [-1, 1]
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// List recent alerts
    Alerts {
        #[arg(long)]
        rule: Option<String>,
        #[arg(long)]
        competitor: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the per-competitor trend summary
    Trends {
        /// Restrict to one competitor id
        #[arg(long)]
        competitor: Option<String>,
    },
    /// Inspect or poll registered sources
    Sources {
        #[command(subcommand)]
        command: Option<SourcesCommands>,
    },
}

#[derive(Debug, Subcommand)]
enum SourcesCommands {
    /// List sources with their health
    List,
    /// Poll one source now
    Poll { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("competeiq-cli ready; run with --help for commands");
        return Ok(());
    };

    let client = || ApiClient::new(&cli.api_url, cli.api_key.as_deref());
    match command {
        Commands::CheckConfig { watchlist } => check::run_check_config(watchlist.as_deref()),
        Commands::Ingest { source, file } => {
            commands::run_ingest(&client()?, &source, &file).await
        }
        Commands::Search {
            query,
            limit,
            threshold,
        } => commands::run_search(&client()?, &query, limit, threshold).await,
        Commands::Alerts {
            rule,
            competitor,
            limit,
        } => {
            commands::run_alerts(&client()?, rule.as_deref(), competitor.as_deref(), limit).await
        }
        Commands::Trends { competitor } => {
            commands::run_trends(&client()?, competitor.as_deref()).await
        }
        Commands::Sources { command } => match command.unwrap_or(SourcesCommands::List) {
            SourcesCommands::List => commands::run_sources_list(&client()?).await,
            SourcesCommands::Poll { id } => commands::run_source_poll(&client()?, &id).await,
        },
    }
}
