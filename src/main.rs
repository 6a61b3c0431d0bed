//! CLI entry point for `mailindexer`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use mailindexer::config::{self, Config};
use mailindexer::decode::DecodeContext;
use mailindexer::index::{schema, BulkIndexer, BulkStats, ElasticClient};
use mailindexer::ingest::{self, BatchOptions, BatchReport, Pipeline};
use mailindexer::store::{AttachmentStore, StoreStats};

/// Index raw MIME messages into Elasticsearch.
///
/// Reads one message from standard input, or every file found under the
/// given paths. Text parts are decoded and indexed; everything else is
/// stored once, named by its SHA-256, in the attachment directory.
#[derive(Parser)]
#[command(name = "mailindexer", version)]
struct Cli {
    /// Message files or directories to ingest ("-" or nothing reads stdin)
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Create the index with the mail mapping instead of ingesting
    #[arg(long)]
    init: bool,

    /// Attachment store directory
    #[arg(long, value_name = "DIR")]
    attachdir: Option<PathBuf>,

    /// Elasticsearch base URL
    #[arg(long, value_name = "URL")]
    elastic: Option<String>,

    /// Index name
    #[arg(long, value_name = "NAME")]
    index: Option<String>,

    /// Batch worker threads (0 = available parallelism)
    #[arg(short = 'j', long, value_name = "N")]
    workers: Option<usize>,

    /// Configuration file
    #[arg(long, value_name = "FILE", env = config::CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Do not show the batch progress spinner
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    /// Command-line flags win over the configuration file.
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.attachdir {
            config.store.attach_dir = dir.clone();
        }
        if let Some(url) = &self.elastic {
            config.index.url = url.clone();
        }
        if let Some(name) = &self.index {
            config.index.name = name.clone();
        }
        if let Some(workers) = self.workers {
            config.ingest.workers = workers;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    cli.apply(&mut config);

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    let client = ElasticClient::new(&config.index).context("Could not create index client")?;

    if cli.init {
        return cmd_init(&client);
    }

    let decode = DecodeContext::new(config.decode.strict_charset);
    let store = AttachmentStore::open(&config.store.attach_dir).with_context(|| {
        format!(
            "Could not open attachment directory {}",
            config.store.attach_dir.display()
        )
    })?;
    let pipeline = Pipeline::new(&decode, &store);

    if ingest::Task::is_stdin(&cli.paths) {
        cmd_single(&pipeline, &client)
    } else {
        cmd_batch(&pipeline, client, &cli, &config)
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // A bare file name lands in the working directory.
    let log_file = config.general.log_file.as_ref().and_then(|path| {
        let name = path.file_name()?.to_os_string();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).ok()?;
        Some((dir, name))
    });

    if let Some((dir, name)) = log_file {
        let file_appender = tracing_appender::rolling::never(dir, name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Create the index with the mail mapping.
fn cmd_init(client: &ElasticClient) -> anyhow::Result<()> {
    let response = client
        .create_index(&schema::index_settings())
        .with_context(|| format!("Could not initialize index '{}'", client.index_name()))?;
    tracing::info!(index = client.index_name(), response = %response, "Index created");
    println!("Created index '{}'", client.index_name());
    Ok(())
}

/// Index one message read from standard input.
fn cmd_single(pipeline: &Pipeline<'_>, client: &ElasticClient) -> anyhow::Result<()> {
    let doc = ingest::run_single(pipeline, client, std::io::stdin().lock())
        .context("Could not index message from standard input")?;
    if doc.id.is_empty() {
        println!("Indexed message (no Message-Id)");
    } else {
        println!("Indexed {}", doc.id);
    }
    Ok(())
}

/// Index every file under the given paths through the bulk indexer.
fn cmd_batch(
    pipeline: &Pipeline<'_>,
    client: ElasticClient,
    cli: &Cli,
    config: &Config,
) -> anyhow::Result<()> {
    let indexer = BulkIndexer::from_config(client, &config.index);
    let options = BatchOptions {
        workers: config.ingest.effective_workers(),
        queue_capacity: config.ingest.queue_capacity,
    };

    let pb = if cli.no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} Indexing {pos} messages ({per_sec}, {elapsed})")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let start = Instant::now();
    let report = ingest::run_batch(
        pipeline,
        &indexer,
        &cli.paths,
        options,
        Some(&|done| pb.set_position(done as u64)),
    );
    pb.finish_and_clear();

    // Whatever was accepted before a fatal walk error still gets submitted.
    let bulk = indexer.close();
    let report = report.context("Batch ingestion aborted")?;

    print_summary(&report, &bulk, &pipeline.store().stats(), start.elapsed());
    Ok(())
}

fn print_summary(report: &BatchReport, bulk: &BulkStats, store: &StoreStats, elapsed: Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  Ingestion complete:");
    println!("  {:<25} {}", "Files found", report.enumerated);
    println!("  {:<25} {}", "Messages processed", report.indexed);
    println!("  {:<25} {}", "Messages failed", report.failed);
    if report.skipped > 0 {
        println!("  {:<25} {}", "Entries skipped", report.skipped);
    }
    println!("  {:<25} {}", "Documents indexed", bulk.submitted);
    if bulk.failed > 0 {
        println!("  {:<25} {}", "Documents rejected", bulk.failed);
    }
    println!("  {:<25} {}", "Bulk requests", bulk.requests);
    println!("  {:<25} {}", "Attachments written", store.written);
    println!("  {:<25} {}", "Attachments deduplicated", store.deduplicated);
    if store.failed > 0 {
        println!("  {:<25} {}", "Attachments failed", store.failed);
    }
    println!(
        "  {:<25} {}",
        "Attachment bytes",
        format_size(store.bytes_written, BINARY)
    );
    println!("  {:<25} {:.1}s", "Elapsed", elapsed.as_secs_f64());
    println!();
}
