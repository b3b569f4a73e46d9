use std::env;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use aift_collector::cli::{Args, CollectOpts, Commands, ExportFormatArg, FilterOpts};
use aift_collector::collectors::Runner;
use aift_collector::config::{load_or_create_config, CollectionConfig};
use aift_collector::error::RunError;
use aift_collector::models::{Artifact, ArtifactType, RawTimestamp};
use aift_collector::normalize::{normalize_timestamp, truncate_chars};
use aift_collector::storage::{ArtifactQuery, Page, Store};
use aift_collector::utils::export::{export_to_file, ExportFormat};
use aift_collector::utils::summary::{render_presence_report, render_run_report, write_run_summary};

/// Width of the preview column in table output.
const TABLE_PREVIEW_CHARS: usize = 80;

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.verbose)?;

    if let Commands::InitConfig { path } = &args.command {
        info!("Creating default configuration file at {}", path.display());
        CollectionConfig::create_default_config_file(path)?;
        info!("Configuration created successfully");
        return Ok(());
    }

    let config = load_or_create_config(args.config.as_deref())?;
    let store_path = args.db.clone().unwrap_or_else(|| config.store_path());

    match &args.command {
        Commands::Collect(opts) => handle_collect(&config, &store_path, opts),
        Commands::Browse(filters) => {
            let store = open_store(&store_path)?;
            print_page(&store.query(&build_query(filters, None)?)?, filters.json)
        }
        Commands::Search { text, filters } => {
            let store = open_store(&store_path)?;
            print_page(&store.query(&build_query(filters, Some(text))?)?, filters.json)
        }
        Commands::Timeline(filters) => {
            let store = open_store(&store_path)?;
            print_page(&store.timeline(&build_query(filters, None)?)?, filters.json)
        }
        Commands::Stats => {
            let store = open_store(&store_path)?;
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
            Ok(())
        }
        Commands::Runs { limit } => {
            let store = open_store(&store_path)?;
            for run in store.recent_runs(*limit)? {
                print!("{}", render_run_report(&run));
            }
            Ok(())
        }
        Commands::Export { format, output, filters } => {
            let store = open_store(&store_path)?;
            let format = match format {
                ExportFormatArg::Json => ExportFormat::Json,
                ExportFormatArg::Jsonl => ExportFormat::JsonLines,
            };
            let count = export_to_file(&store, &build_query(filters, None)?, format, output)?;
            println!("Exported {} artifacts to {}", count, output.display());
            Ok(())
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(log_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .context("Failed to initialize logger")?;
    Ok(())
}

fn handle_collect(config: &CollectionConfig, store_path: &Path, opts: &CollectOpts) -> Result<()> {
    let mut runner = Runner::from_config(config);
    if let Some(workers) = opts.workers {
        runner = runner.with_workers(workers);
    }

    if opts.dry_run {
        info!("Dry run: detecting sources only");
        print!("{}", render_presence_report(&runner.dry_run()));
        return Ok(());
    }

    let mut store = open_store(store_path)?;
    let (hostname, username) = host_identity()?;

    let run = match runner.run(&mut store, &hostname, &username) {
        Ok(run) => run,
        Err(RunError::StorageWrite { summary, source }) => {
            error!("Collection aborted: {}", source);
            print!("{}", render_run_report(&summary));
            if let Some(path) = &opts.summary_json {
                write_run_summary(&summary, path)?;
            }
            return Err(anyhow!("storage write failed: {source}"));
        }
    };

    print!("{}", render_run_report(&run));
    if let Some(path) = &opts.summary_json {
        write_run_summary(&run, path)?;
    }
    if runner.permissions().should_suggest_access() {
        warn!("Some sources were unreadable; see the permission summary above");
    }
    Ok(())
}

fn open_store(path: &Path) -> Result<Store> {
    Store::open(path).with_context(|| format!("Failed to open evidence store {}", path.display()))
}

/// Hostname and login name recorded on every run.
fn host_identity() -> Result<(String, String)> {
    let hostname = hostname::get()
        .map_err(|e| anyhow!("Failed to get hostname: {}", e))?
        .to_string_lossy()
        .into_owned();
    let username = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    Ok((hostname, username))
}

fn parse_bound(raw: &str) -> Result<DateTime<Utc>> {
    normalize_timestamp(&RawTimestamp::Text(raw.to_string()))
        .ok_or_else(|| anyhow!("unrecognized time bound: {raw}"))
}

fn build_query(filters: &FilterOpts, text: Option<&String>) -> Result<ArtifactQuery> {
    let artifact_type = match &filters.artifact_type {
        Some(raw) => Some(raw.parse::<ArtifactType>().map_err(|e| anyhow!(e))?),
        None => None,
    };
    let since = filters.since.as_deref().map(parse_bound).transpose()?;
    let until = filters.until.as_deref().map(parse_bound).transpose()?;
    if let (Some(since), Some(until)) = (since, until) {
        if since >= until {
            bail!("--since must be earlier than --until");
        }
    }

    Ok(ArtifactQuery {
        source: filters.source.clone(),
        artifact_type,
        since,
        until,
        text: text.cloned(),
        run_id: filters.run.clone(),
        credential_only: filters.credentials,
        cursor: filters.cursor.clone(),
        limit: filters.limit,
    })
}

fn print_page(page: &Page, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }
    page.artifacts.iter().for_each(print_artifact_row);
    if let Some(cursor) = &page.next_cursor {
        println!("-- more: --cursor '{cursor}'");
    }
    Ok(())
}

fn print_artifact_row(artifact: &Artifact) {
    let when = artifact
        .timestamp
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".repeat(19));
    let text = artifact.title.as_deref().unwrap_or(&artifact.content_preview);
    let (preview, _) = truncate_chars(&text.replace('\n', " "), TABLE_PREVIEW_CHARS);
    let flag = if artifact.credential_detected { "!" } else { " " };
    println!(
        "{} {}{:<16} {:<22} {}",
        when,
        flag,
        artifact.source,
        artifact.artifact_type.as_str(),
        preview
    );
}
