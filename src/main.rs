//! OpsReview - operational review runner
//!
//! A CLI that runs every configured analysis against a managed service
//! instance in parallel and consolidates the stored results into a report.
//!
//! Exit codes:
//!   0 - Review completed (possibly with some analyzers failed)
//!   1 - Runtime error (config, storage, etc.)
//!   2 - Review failed (no analyzer succeeded, or report generation failed)

use anyhow::{Context, Result};
use opsreview::aggregator::Aggregator;
use opsreview::cli::{Args, OutputFormat};
use opsreview::config::{Config, CONFIG_FILE};
use opsreview::coordinator::Coordinator;
use opsreview::invoker::HttpTaskInvoker;
use opsreview::models::{ReviewId, ReviewParameters};
use opsreview::report::{generate_summary_text, list_reports, JsonReportStage};
use opsreview::store::{open_store, ResultStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("OpsReview v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("OpsReview failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .opsreview.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the target instance, task endpoints and storage backend.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Dispatch to the requested action. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    if args.list_reports {
        return handle_list_reports(&config);
    }

    // The backend is chosen here, once, and injected everywhere else
    let store = open_store(&config.storage)
        .await
        .context("Failed to open result store")?;

    if let Some(ref review_id) = args.status {
        return handle_status(store.as_ref(), review_id).await;
    }

    run_review(&args, &config, store).await
}

/// Run one review and print its summary. Returns 0 or 2.
async fn run_review(args: &Args, config: &Config, store: Arc<dyn ResultStore>) -> Result<i32> {
    let tasks = config.analysis_tasks()?;
    let invoker = HttpTaskInvoker::new(config.review.task_timeout())
        .context("Failed to create HTTP client")?;
    let reporter = JsonReportStage::new(
        Aggregator::new(Arc::clone(&store)),
        config.general.output_dir.clone(),
    );

    let context = config.review_context()?;

    if config.review.task_timeout().is_none() {
        debug!("No per-task timeout configured; a hung analyzer blocks the review");
    }

    let coordinator = Coordinator::new(
        store,
        Arc::new(invoker),
        Arc::new(reporter),
        tasks,
        context,
    );

    if !args.quiet && args.format == OutputFormat::Text {
        println!(
            "🚀 Starting review with daysBack={} ({} analyzers)",
            config.review.days_back,
            coordinator.tasks().len()
        );
    }

    let summary = coordinator
        .start_review(ReviewParameters {
            days_back: config.review.days_back,
        })
        .await;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => println!("\n{}", generate_summary_text(&summary)),
    }

    if summary.is_completed() {
        Ok(0)
    } else {
        Ok(2)
    }
}

/// Handle --status: print the stored status of a review.
async fn handle_status(store: &dyn ResultStore, review_id: &str) -> Result<i32> {
    let review_id: ReviewId = review_id.parse()?;

    match store.get_status(&review_id).await? {
        Some(status) => {
            println!("{} Review {}", status.status.emoji(), status.review_id);
            println!("   Status: {}", status.status);
            println!("   Message: {}", status.message);
            println!("   Started: {}", review_id.created_at().format("%Y-%m-%d %H:%M:%S UTC"));
            println!("   Updated: {}", status.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
            Ok(0)
        }
        None => {
            eprintln!("No status recorded for review {}", review_id);
            Ok(1)
        }
    }
}

/// Handle --list-reports: show the most recent consolidated reports.
fn handle_list_reports(config: &Config) -> Result<i32> {
    let dir = &config.general.output_dir;
    let reports = list_reports(dir, 10)
        .with_context(|| format!("Failed to list reports in {}", dir.display()))?;

    if reports.is_empty() {
        println!("No reports found in {}", dir.display());
        return Ok(0);
    }

    println!("📁 Recent reports in {}:\n", dir.display());
    for report in reports {
        println!("  {}", report.path.display());
        println!("    Size: {:.1} KB", report.size as f64 / 1024.0);
        println!("    Modified: {}\n", report.modified.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
