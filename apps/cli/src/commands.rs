//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use lessonvault_catalog::Catalog;
use lessonvault_core::Pipeline;
use lessonvault_shared::{AppConfig, IngestOptions, config_dir, init_config, load_config};
use lessonvault_source::{
    ChannelProvider, SourceClient, SourceClientConfig, SourceProvider, TopicTreeProvider,
};
use lessonvault_store::{FsObjectStore, HttpObjectStore, ObjectStore};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LessonVault — archive educational video libraries with searchable transcripts.
#[derive(Parser)]
#[command(
    name = "lessonvault",
    version,
    about = "Discover, download and archive educational content with processed transcripts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Source API flavor.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ProviderKind {
    /// Whole content tree served as one nested document.
    TopicTree,
    /// Paginated channel/contentnode API.
    Channel,
}

/// Flags identifying the discovery source.
#[derive(clap::Args)]
pub(crate) struct SourceArgs {
    /// Base URL of the source API.
    #[arg(long)]
    source_url: Option<String>,

    /// Source API flavor.
    #[arg(long, value_enum, default_value = "topic-tree")]
    provider: ProviderKind,

    /// Identifier recorded on discovered entries.
    #[arg(long, default_value = "default")]
    source_id: String,

    /// Channel identifier (channel provider only).
    #[arg(long)]
    channel_id: Option<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Walk the source tree and merge discovered items into the catalog.
    Discover {
        #[command(flatten)]
        source: SourceArgs,

        /// Catalog document path (defaults to ~/.lessonvault/catalog.json).
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Minimum seconds between source requests.
        #[arg(long)]
        rate_limit_seconds: Option<f64>,
    },

    /// Fetch, process and upload pending catalog items.
    Ingest {
        /// Catalog document path (defaults to ~/.lessonvault/catalog.json).
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Cap on items processed this run (0 = unlimited).
        #[arg(long)]
        max: Option<usize>,

        /// Worker pool size.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Caption-only ingestion: skip media downloads and uploads.
        #[arg(long)]
        skip_media: bool,

        /// Archive raw captions without transcript processing.
        #[arg(long)]
        skip_transcript: bool,

        /// Keep local staging files after a verified upload.
        #[arg(long)]
        keep_local: bool,

        /// Local staging directory.
        #[arg(long)]
        staging_dir: Option<String>,

        /// Minimum seconds between source requests.
        #[arg(long)]
        rate_limit_seconds: Option<f64>,

        /// Remote bucket base URL (overrides config).
        #[arg(long)]
        remote_bucket: Option<String>,

        /// Local store directory, used when no bucket is configured.
        #[arg(long)]
        local_store: Option<String>,

        /// Re-run discovery against the source before ingesting.
        #[arg(long)]
        refresh: bool,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Show per-status catalog counts and exhausted failures.
    Status {
        /// Catalog document path (defaults to ~/.lessonvault/catalog.json).
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lessonvault=info",
        1 => "lessonvault=debug",
        _ => "lessonvault=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Discover {
            source,
            catalog,
            rate_limit_seconds,
        } => cmd_discover(&source, catalog, rate_limit_seconds).await,
        Command::Ingest {
            catalog,
            max,
            concurrency,
            skip_media,
            skip_transcript,
            keep_local,
            staging_dir,
            rate_limit_seconds,
            remote_bucket,
            local_store,
            refresh,
            source,
        } => {
            cmd_ingest(IngestArgs {
                catalog,
                max,
                concurrency,
                skip_media,
                skip_transcript,
                keep_local,
                staging_dir,
                rate_limit_seconds,
                remote_bucket,
                local_store,
                refresh,
                source,
            })
            .await
        }
        Command::Status { catalog } => cmd_status(catalog).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn expand_path(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

fn resolve_catalog_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => Ok(config_dir()?.join("catalog.json")),
    }
}

fn build_client(config: &AppConfig, rate_limit_seconds: Option<f64>) -> Result<Arc<SourceClient>> {
    let rate = rate_limit_seconds
        .unwrap_or(config.source.rate_limit_seconds)
        .max(0.0);
    let client = SourceClient::new(SourceClientConfig {
        rate_limit: Duration::from_secs_f64(rate),
        max_retries: config.source.max_retries,
        request_timeout: Duration::from_secs(config.source.request_timeout_secs),
        gone_is_permanent: config.source.gone_is_permanent,
    })?;
    Ok(Arc::new(client))
}

fn build_provider(args: &SourceArgs) -> Result<Box<dyn SourceProvider>> {
    let url = args
        .source_url
        .as_deref()
        .ok_or_else(|| eyre!("--source-url is required"))?;
    url::Url::parse(url).map_err(|e| eyre!("invalid source URL '{url}': {e}"))?;
    match args.provider {
        ProviderKind::TopicTree => Ok(Box::new(TopicTreeProvider::new(&args.source_id, url))),
        ProviderKind::Channel => {
            let channel = args
                .channel_id
                .as_deref()
                .ok_or_else(|| eyre!("--channel-id is required with --provider channel"))?;
            Ok(Box::new(ChannelProvider::new(&args.source_id, url, channel)))
        }
    }
}

/// Pick the object store: an HTTP bucket when one is configured, otherwise a
/// local directory store. Returns the store and a display label.
fn build_store(
    config: &AppConfig,
    remote_bucket: Option<&str>,
    local_store: Option<&str>,
) -> Result<(Arc<dyn ObjectStore>, String)> {
    let bucket = remote_bucket.map(str::to_string).or_else(|| {
        (!config.storage.bucket_url.is_empty()).then(|| config.storage.bucket_url.clone())
    });
    match bucket {
        Some(url) => Ok((Arc::new(HttpObjectStore::new(&url)?), url)),
        None => {
            let root = expand_path(local_store.unwrap_or(&config.storage.local_root));
            let label = root.display().to_string();
            Ok((Arc::new(FsObjectStore::new(root)), label))
        }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar.set_message(message.to_string());
    bar
}

// ---------------------------------------------------------------------------
// discover
// ---------------------------------------------------------------------------

async fn cmd_discover(
    source: &SourceArgs,
    catalog: Option<PathBuf>,
    rate_limit_seconds: Option<f64>,
) -> Result<()> {
    let config = load_config()?;
    let catalog_path = resolve_catalog_path(catalog)?;
    let client = build_client(&config, rate_limit_seconds)?;
    let provider = build_provider(source)?;
    let (store, _) = build_store(&config, None, None)?;

    info!(
        catalog = %catalog_path.display(),
        source_id = source.source_id,
        "starting discovery"
    );

    let pipeline = Pipeline::new(
        &catalog_path,
        client,
        store,
        IngestOptions::from(&config),
    );

    let bar = spinner("Discovering content tree...");
    let started = Instant::now();
    let result = pipeline.discover_into_catalog(provider.as_ref()).await;
    bar.finish_and_clear();
    let (inserted, report) = result?;

    println!();
    println!("  Discovery complete");
    println!("  Nodes visited:    {}", report.nodes_visited);
    println!("  Items found:      {}", report.leaves_found);
    println!("  Branches skipped: {}", report.branches_skipped);
    println!("  New entries:      {inserted}");
    println!("  Catalog:          {}", catalog_path.display());
    println!("  Time:             {:.1}s", started.elapsed().as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

struct IngestArgs {
    catalog: Option<PathBuf>,
    max: Option<usize>,
    concurrency: Option<usize>,
    skip_media: bool,
    skip_transcript: bool,
    keep_local: bool,
    staging_dir: Option<String>,
    rate_limit_seconds: Option<f64>,
    remote_bucket: Option<String>,
    local_store: Option<String>,
    refresh: bool,
    source: SourceArgs,
}

async fn cmd_ingest(args: IngestArgs) -> Result<()> {
    let config = load_config()?;
    let catalog_path = resolve_catalog_path(args.catalog)?;
    let client = build_client(&config, args.rate_limit_seconds)?;
    let (store, store_label) = build_store(
        &config,
        args.remote_bucket.as_deref(),
        args.local_store.as_deref(),
    )?;

    let mut options = IngestOptions::from(&config);
    if let Some(max) = args.max {
        options.max_items = max;
    }
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency.max(1);
    }
    options.skip_media |= args.skip_media;
    options.skip_transcript |= args.skip_transcript;
    options.keep_local |= args.keep_local;
    options.staging_dir = args
        .staging_dir
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(|| expand_path(&config.defaults.staging_dir));

    let provider = if args.refresh {
        Some(build_provider(&args.source)?)
    } else {
        None
    };

    info!(
        catalog = %catalog_path.display(),
        store = store_label,
        max = options.max_items,
        concurrency = options.concurrency,
        "starting ingest run"
    );

    let pipeline = Pipeline::new(&catalog_path, client, store, options);

    // Ctrl-C finishes in-flight items, then stops cleanly.
    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight items");
            stop.store(true, Ordering::Relaxed);
        }
    });

    let bar = spinner("Ingesting...");
    let started = Instant::now();
    let result = pipeline.ingest(provider.as_deref()).await;
    bar.finish_and_clear();
    let summary = result?;

    println!();
    println!("  Ingest run {}", summary.run_id);
    if args.refresh {
        println!("  Discovered:    {}", summary.discovered);
    }
    println!("  Selected:      {}", summary.selected);
    println!("  Fetched:       {}", summary.fetched);
    println!("  Processed:     {}", summary.processed);
    println!("  Uploaded:      {}", summary.uploaded);
    println!("  No transcript: {}", summary.no_transcript);
    println!("  Failed:        {}", summary.failed);
    for failure in summary.failures.iter().take(10) {
        println!(
            "    {}:{} ({})",
            failure.source_id, failure.content_id, failure.reason
        );
    }
    if summary.failures.len() > 10 {
        println!("    ... and {} more", summary.failures.len() - 10);
    }
    println!("  Store:         {store_label}");
    println!("  Time:          {:.1}s", started.elapsed().as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

async fn cmd_status(catalog: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let catalog_path = resolve_catalog_path(catalog)?;
    let catalog = Catalog::load(&catalog_path)?;

    println!();
    println!("  Catalog: {}", catalog_path.display());
    println!("  Entries: {}", catalog.entries.len());
    println!("  Updated: {}", catalog.last_updated.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    for (status, count) in catalog.status_counts() {
        if count > 0 {
            println!("  {status:<14} {count}");
        }
    }

    let exhausted = catalog.permanently_failed(config.defaults.max_attempts.max(1));
    if !exhausted.is_empty() {
        println!();
        println!("  Exhausted failures:");
        for entry in exhausted.iter().take(10) {
            println!(
                "    {}:{} ({})",
                entry.source_id,
                entry.content_id,
                entry.last_error.as_deref().unwrap_or("unknown")
            );
        }
        if exhausted.len() > 10 {
            println!("    ... and {} more", exhausted.len() - 10);
        }
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
