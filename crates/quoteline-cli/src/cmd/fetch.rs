//! Fetch subcommand - one quote batch, stored, written and optionally screened

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use quoteline_core::{SharedProgress, is_shutdown_requested};
use quoteline_screen::source::{load_identifiers, qualify};
use quoteline_screen::{
    BatchStatus, CsvSink, PersistenceSink, QuoteFetcher, RegionConfig, SnapshotStore,
    ThresholdFilter,
};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Identifier list: headerless CSV, codes in the first column
    #[arg(long)]
    pub codes: Option<PathBuf>,

    /// Region config JSON (field indices, thresholds, urls)
    #[arg(long)]
    pub region_config: Option<PathBuf>,

    /// Region key inside the config JSON
    #[arg(long)]
    pub region: Option<String>,

    /// Output directory for CSV files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Abort the batch on the first failed identifier
    #[arg(long)]
    pub fail_fast: bool,

    /// Screen the snapshot against the region's threshold rules
    #[arg(long)]
    pub screen: bool,

    /// Print these codes from the snapshot (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub show: Vec<String>,
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let codes_path = args.codes.unwrap_or_else(|| config.input.codes_file.clone());
    let region_path = args
        .region_config
        .unwrap_or_else(|| config.input.config_file.clone());
    let region_name = args.region.unwrap_or_else(|| config.input.region.clone());
    let output_dir = args.output.unwrap_or_else(|| config.output.dir.clone());

    let region = RegionConfig::from_file(&region_path, &region_name, &config.input.identifier_field)
        .context("Cannot load region config")?;
    let identifiers = load_identifiers(&codes_path).context("Cannot load identifiers")?;

    let mut options = config.batch_options();
    if args.fail_fast {
        options.allow_partial_results = false;
    }
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    let fetcher = QuoteFetcher::new(region, options).context("Invalid fetch settings")?;

    log::info!("Fetching {} quotes for region {region_name}", identifiers.len());
    log::info!("  Codes: {}", codes_path.display());
    log::info!("  Output: {}", output_dir.display());

    let pb = progress.batch_bar("quotes");
    let report = fetcher.fetch(&identifiers, Some(progress.observer_for(pb.clone())))?;
    pb.finish_and_clear();

    if progress.is_tty() {
        progress.println(report.summary.format_table("Quotes"));
    } else {
        report.summary.log();
    }

    let snapshot = match report.status {
        BatchStatus::Complete(snapshot) => snapshot,
        BatchStatus::Aborted { identifier, reason } => {
            log::error!("Aborted at {identifier}: {reason}");
            return Ok(ExitCode::from(1));
        }
    };
    if is_shutdown_requested() {
        log::warn!("Shutdown requested, {} identifiers not fetched", report.summary.skipped);
    }

    let store = SnapshotStore::new(config.screen.bounds);
    store.replace(snapshot);
    let sink = CsvSink::new(&output_dir);
    sink.write(&store.current(), "stock")
        .context("Failed to write snapshot CSV")?;

    if args.screen {
        let rules = &fetcher.region().rules;
        let passing = store
            .query_by_thresholds(rules)
            .context("Threshold rules do not match the snapshot")?;
        println!("{} of {} passed the thresholds", passing.len(), store.current().len());
        for identifier in &passing {
            println!("{identifier}");
        }
        let passed = ThresholdFilter::new(rules.clone(), store.bounds())
            .apply(&store.current())
            .context("Threshold rules do not match the snapshot")?;
        sink.write(&passed, "interest_stock")
            .context("Failed to write screened CSV")?;
    }

    if !args.show.is_empty() {
        let wanted: Vec<String> = args
            .show
            .iter()
            .map(|code| qualify(code).unwrap_or_else(|| code.clone()))
            .collect();
        let found = store.lookup(&wanted);
        if found.is_empty() {
            println!("No matching stock found.");
        } else {
            println!("{}", found.table);
        }
    }

    if is_shutdown_requested() {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}
