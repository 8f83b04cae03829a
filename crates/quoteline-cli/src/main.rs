//! quoteline - Concurrent quote fetching and threshold screening
//!
//! Fetches quotes for a list of instrument codes, stores the batch as a
//! snapshot, writes it to CSV and screens it against threshold rules.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "quoteline")]
#[command(about = "Concurrent quote fetching and threshold screening")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./quoteline.toml or ~/.config/quoteline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Maximum simultaneous requests
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch quotes, store the snapshot and write it to CSV
    Fetch(cmd::fetch::FetchArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(quoteline_core::ProgressContext::new());

    // Logging:
    //   TTY:     warn unless --debug (the progress bar shows activity)
    //   non-TTY: info unless --debug (logs are the only progress indicator)
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    quoteline_core::init_logging(quiet, cli.debug, multi);

    setup_signal_handler()?;

    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    // CLI overrides
    if let Some(max_retries) = cli.max_retries {
        config.fetch.max_retries = max_retries;
    }
    if let Some(concurrency) = cli.concurrency {
        config.fetch.concurrency = concurrency;
    }

    match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, &config, &progress),
        Command::Config => {
            cmd::print_settings(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// First signal: stop issuing requests. Second signal: exit immediately.
fn setup_signal_handler() -> Result<()> {
    use anyhow::Context;
    use signal_hook::consts::{SIGINT, SIGTERM};

    for signal in [SIGTERM, SIGINT] {
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        let registered = unsafe {
            signal_hook::low_level::register(signal, || {
                if quoteline_core::shutdown_flag().swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            })
        };
        registered.with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}
