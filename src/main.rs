//! Paperchase - chunked keyword collection from a rate-limited newspaper archive
//!
//! A CLI tool that partitions a year range into calendar chunks, queries
//! the archive one chunk at a time, and exports the merged records plus
//! publisher and period rollups.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime or configuration error (invalid range, unreadable config, etc.)
//!   2 - At least one chunk ended partial and --strict was set

mod analysis;
mod cli;
mod config;
mod error;
mod executor;
mod models;
mod planner;
mod report;
mod source;

use analysis::aggregator::duplicate_groups;
use analysis::{MasterCollection, Rollups};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, SourceKind, DEFAULT_CONFIG_FILE};
use executor::{ChunkExecutor, RunState};
use models::Chunk;
use report::csv_export;
use report::{ChunkFileSink, RecordExporter, RunMetadata, RunReport};
use source::{HttpSource, ReplaySource, RetrievalSource};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
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

    info!("Paperchase v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_collection(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Collection failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .paperchase.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the keyword, year range, source and publishers.");
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

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete collection workflow. Returns the exit code (0 or 2).
async fn run_collection(args: Args) -> Result<i32> {
    let started_at = Utc::now();
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    // Step 1: Plan the chunks
    let chunks = planner::plan_chunks(
        config.run.start_year,
        config.run.end_year,
        config.run.granularity,
    )?;

    if args.dry_run {
        return handle_dry_run(&config, &chunks);
    }

    let directory = config.publisher_directory();
    debug!("Publisher directory has {} entries", directory.len());

    // Step 2: Connect the source
    let source: Box<dyn RetrievalSource> = match config.source.kind {
        SourceKind::Http => Box::new(HttpSource::new(config.http_source_config())?),
        SourceKind::Replay => {
            info!("Replaying recordings from {}", config.source.replay_dir.display());
            Box::new(ReplaySource::new(config.source.replay_dir.clone()))
        }
    };

    let output_dir = config.export.output_dir.clone();
    std::fs::create_dir_all(&output_dir).with_context(|| {
        format!("Failed to create output directory {}", output_dir.display())
    })?;

    println!("📰 Collecting \"{}\"", config.run.keyword);
    println!(
        "   Range: {}-{} ({} {} chunks)",
        config.run.start_year,
        config.run.end_year,
        chunks.len(),
        config.run.granularity
    );
    println!("   Location: {}", config.run.location);
    println!("   Limit per chunk: {}", config.run.per_chunk_limit);
    println!("   Delay between chunks: {}s", config.run.delay_seconds);
    println!("   Output: {}\n", output_dir.display());

    // Step 3: Execute the chunks
    let exporter = RecordExporter::new(
        &config.run.keyword,
        directory.clone(),
        config.export.preview_chars,
    );
    let mut sink = ChunkFileSink::new(
        exporter.clone(),
        &output_dir,
        config.export.write_chunk_files,
        args.resume,
    );

    let executor = ChunkExecutor::new(source, config.executor_options(!args.quiet));
    let state = executor
        .run(chunks, &config.query_template(), &mut sink)
        .await;
    let mut files = sink.into_written();

    // Step 4: Merge and summarize
    let master = analysis::merge(&state.results);
    log_duplicates(&master);
    let rollups = analysis::summarize(&master, &directory);

    // Step 5: Export
    println!("\n💾 Writing exports...");
    let years = [config.run.start_year, config.run.end_year];
    let labels: HashMap<String, String> = state
        .results
        .iter()
        .map(|r| (r.chunk.name.clone(), r.chunk.label.clone()))
        .collect();
    files.extend(csv_export::write_collection_exports(
        &exporter, &output_dir, years, &labels, &master, &rollups,
    ));

    // Step 6: Run report
    let metadata = RunMetadata {
        keyword: config.run.keyword.clone(),
        start_year: config.run.start_year,
        end_year: config.run.end_year,
        location: config.run.location.clone(),
        granularity: config.run.granularity,
        started_at,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };
    let run_report = RunReport::new(metadata, &state, &master, &rollups, files);

    let format = config.export.report_format;
    let report_path = output_dir.join(csv_export::report_file_name(
        &config.run.keyword,
        years,
        format.extension(),
    ));
    let output = match format {
        OutputFormat::Json => report::generate_json_report(&run_report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&run_report),
    };
    match std::fs::write(&report_path, &output) {
        Ok(()) => info!("Run report saved to {}", report_path.display()),
        Err(e) => error!("Failed to write run report {}: {}", report_path.display(), e),
    }

    print_summary(&state, &master, &rollups);

    if args.strict && state.partial() > 0 {
        eprintln!(
            "\n⛔ {} chunk(s) ended partial. Failing (exit code 2).",
            state.partial()
        );
        return Ok(2);
    }

    Ok(0)
}

fn log_duplicates(master: &MasterCollection) {
    let stats = master.stats;
    info!(
        "Records: {} total, {} unique, {} sharing a date/publisher/page",
        stats.total, stats.unique, stats.duplicates
    );

    for (key, count) in duplicate_groups(master).iter().take(5) {
        debug!(
            "Repeated key x{}: {} | {} | page {}",
            count, key.date, key.publisher, key.page
        );
    }
}

fn print_summary(state: &RunState, master: &MasterCollection, rollups: &Rollups) {
    println!("\n📊 Collection Summary:");
    println!("   Successful chunks: {}", state.successful());
    println!("   Partial chunks: {}", state.partial());
    if state.resumed() > 0 {
        println!("   Resumed from disk: {}", state.resumed());
    }
    if state.refined > 0 {
        println!("   Re-split (truncated): {}", state.refined);
    }
    println!("   Total records: {}", master.len());
    println!("   Duplicate keys: {}", master.stats.duplicates);
    println!("   Publishers: {}", rollups.by_publisher.len());
    if let Some(pct) = rollups.low_match.percentage {
        println!(
            "   Pages with {} or fewer matches: {} ({:.1}%)",
            rollups.low_match.threshold, rollups.low_match.pages, pct
        );
    }
    println!("   Duration: {:.1} min", state.elapsed.as_secs_f64() / 60.0);

    for partial in state.partial_chunks() {
        println!(
            "   ⚠️  {} ({}): {} records kept",
            partial.chunk.label,
            partial.status,
            partial.records.len()
        );
    }

    println!("\n✅ Collection complete!");
}

/// Handle --dry-run: print the chunk plan and exit without querying.
fn handle_dry_run(config: &Config, chunks: &[Chunk]) -> Result<i32> {
    println!("\n🔍 Dry run: chunk plan (no source calls)...\n");

    let template = config.query_template();
    for chunk in chunks {
        println!(
            "     📅 {:<18} {:<24} {} .. {}",
            chunk.name, chunk.label, chunk.start, chunk.end
        );
    }

    if let Some(first) = chunks.first() {
        let query = serde_json::to_string(&template.for_chunk(first))?;
        println!("\n   First query: {}", query);
    }

    let min_wait = config.run.delay_seconds * chunks.len().saturating_sub(1) as u64;
    println!("\n   Total: {} chunks", chunks.len());
    println!(
        "   Minimum time spent in delays: {:.1} min",
        min_wait as f64 / 60.0
    );

    println!("\n✅ Dry run complete. No source calls were made.");
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
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
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
