use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vault_search_core::{
    CacheTracker, CollectionScope, HostEnvironment, HttpEnvironment, ModeHint, QueryDispatcher,
    SearchConfig, SearchFilter, SearchPayload, SearchResponse, SnapshotEnvironment,
    VectorOperation, DEFAULT_LIMIT,
};

#[derive(Parser)]
#[command(name = "vault-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON snapshot holding the sources and blocks collections
    #[arg(long, env = "VAULT_SEARCH_SNAPSHOT", conflicts_with = "host_url")]
    snapshot: Option<PathBuf>,

    /// Base URL of the host bridge that serves the collections
    #[arg(long, env = "VAULT_SEARCH_HOST_URL")]
    host_url: Option<String>,

    /// Key identifying the vault in the reload cache
    #[arg(long, env = "VAULT_SEARCH_VAULT", default_value = "default")]
    vault: String,

    /// JSON file with dispatcher and normalizer settings
    #[arg(long, env = "VAULT_SEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds before the collections are reloaded
    #[arg(long, env = "VAULT_SEARCH_CACHE_TTL")]
    cache_ttl: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Search the sources and blocks collections.
    Search(SearchArgs),
    /// Print collection availability and reload cache state.
    Stats,
}

#[derive(Args)]
struct SearchArgs {
    /// Natural-language query used for semantic lookup (repeatable).
    #[arg(long = "hypothetical", short = 'q')]
    hypotheticals: Vec<String>,

    /// Keyword for lexical search (repeatable).
    #[arg(long = "keyword", short = 'k')]
    keywords: Vec<String>,

    /// Prefer keyword search when keywords are given.
    #[arg(long, default_value_t = false)]
    lexical: bool,

    /// Comma-separated query embedding for direct vector operations.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    vector: Option<Vec<f32>>,

    /// Direct vector operation.
    #[arg(long, value_enum)]
    operation: Option<OperationArg>,

    /// Entity whose embedding anchors a nearest-to search.
    #[arg(long)]
    entity_key: Option<String>,

    /// Number of results to return.
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,

    /// Collections to query.
    #[arg(long, value_enum, default_value_t = ScopeArg::Both)]
    scope: ScopeArg,

    /// Only keep keys starting with this prefix.
    #[arg(long)]
    key_starts_with: Option<String>,

    /// Drop keys starting with this prefix.
    #[arg(long)]
    exclude_key_starts_with: Option<String>,

    /// Read the full request payload from a JSON file instead of flags.
    #[arg(long)]
    payload: Option<PathBuf>,

    /// Print the response as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Sources,
    Blocks,
    Both,
}

impl From<ScopeArg> for CollectionScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Sources => CollectionScope::Sources,
            ScopeArg::Blocks => CollectionScope::Blocks,
            ScopeArg::Both => CollectionScope::Both,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OperationArg {
    Nearest,
    Furthest,
    NearestTo,
}

impl From<OperationArg> for VectorOperation {
    fn from(value: OperationArg) -> Self {
        match value {
            OperationArg::Nearest => VectorOperation::Nearest,
            OperationArg::Furthest => VectorOperation::Furthest,
            OperationArg::NearestTo => VectorOperation::NearestTo,
        }
    }
}

impl SearchArgs {
    fn into_payload(self) -> anyhow::Result<SearchPayload> {
        if let Some(path) = &self.payload {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading payload {}", path.display()))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("parsing payload {}", path.display()));
        }

        Ok(SearchPayload {
            mode: self.lexical.then_some(ModeHint::Lexical),
            hypotheticals: self.hypotheticals,
            keywords: self.keywords,
            direct_vector: self.vector,
            vector_operation: self.operation.map(Into::into),
            entity_key: self.entity_key,
            filter: SearchFilter {
                limit: self.limit,
                collection_scope: self.scope.into(),
                key_starts_with: self.key_starts_with,
                exclude_key_starts_with: self.exclude_key_starts_with,
            },
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SearchConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SearchConfig::default(),
    };
    if let Some(ttl) = cli.cache_ttl {
        config.cache_ttl_seconds = ttl;
    }

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        vault = %cli.vault,
        "vault-search boot"
    );

    let cache = Arc::new(CacheTracker::new(config.cache_ttl_seconds));

    match (&cli.snapshot, &cli.host_url) {
        (Some(path), _) => {
            let environment = SnapshotEnvironment::new(path.clone(), config.aliases.clone());
            run(cli.command, QueryDispatcher::new(environment, cache, config, cli.vault)).await
        }
        (None, Some(url)) => {
            let environment = HttpEnvironment::new(url)?;
            run(cli.command, QueryDispatcher::new(environment, cache, config, cli.vault)).await
        }
        (None, None) => anyhow::bail!("either --snapshot or --host-url is required"),
    }
}

async fn run<E: HostEnvironment>(
    command: Command,
    dispatcher: QueryDispatcher<E>,
) -> anyhow::Result<()> {
    match command {
        Command::Search(args) => {
            let json = args.json;
            let payload = args.into_payload()?;
            let response = dispatcher.execute_search(&payload).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }
        Command::Stats => {
            dispatcher.refresh_if_stale().await;
            let stats = serde_json::json!({
                "environment": dispatcher.environment_summary().await,
                "cache": dispatcher.cache_stats(),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn print_response(response: &SearchResponse) {
    let params = &response.search_params;
    println!(
        "mode: selected={:?} effective={:?} results={} of {} (candidates {})",
        params.selected_mode,
        params.effective_mode,
        response.count,
        response.total_before_limit,
        response.total_candidates
    );
    for note in &params.fallbacks {
        println!("  fallback: {note}");
    }

    for result in &response.results {
        println!(
            "[{:?}] score={:.4} key={}",
            result.result_type, result.score, result.key
        );
        if result.path != result.key {
            println!("  path={}", result.path);
        }
        if let Some(breadcrumbs) = &result.breadcrumbs {
            println!("  breadcrumbs={breadcrumbs}");
        }
        if result.content_missing {
            println!("  content: <missing>");
        } else {
            println!("  content:\n{}", result.content);
        }
    }
}
