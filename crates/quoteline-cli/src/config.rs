//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use quoteline_core::RetryPolicy;
use quoteline_screen::{BatchOptions, BoundsMode, DEFAULT_IDENTIFIER_FIELD};
use serde::Deserialize;

/// Application settings for quoteline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub screen: ScreenConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Simultaneous requests in flight
    pub concurrency: usize,
    pub workers: usize,
    pub max_retries: u32,
    pub backoff_unit_ms: u64,
    pub timeout_secs: u64,
    pub allow_partial_results: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let batch = BatchOptions::default();
        Self {
            concurrency: batch.concurrency_limit,
            workers: batch.workers,
            max_retries: batch.retry.max_retries,
            backoff_unit_ms: batch.retry.backoff_unit.as_millis() as u64,
            timeout_secs: batch.request_timeout.as_secs(),
            allow_partial_results: batch.allow_partial_results,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct ScreenConfig {
    pub bounds: BoundsMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Region config JSON (field indices, thresholds, urls)
    pub config_file: PathBuf,
    /// Headerless CSV, identifiers in the first column
    pub codes_file: PathBuf,
    pub region: String,
    pub identifier_field: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("./config.json"),
            codes_file: PathBuf::from("./stock_code.csv"),
            region: "CN".to_string(),
            identifier_field: DEFAULT_IDENTIFIER_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./quoteline.toml (current directory)
    /// 2. ~/.config/quoteline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("quoteline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "quoteline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Batch options from the `[fetch]` section
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency_limit: self.fetch.concurrency,
            workers: self.fetch.workers,
            retry: RetryPolicy {
                max_retries: self.fetch.max_retries,
                backoff_unit: Duration::from_millis(self.fetch.backoff_unit_ms),
            },
            allow_partial_results: self.fetch.allow_partial_results,
            request_timeout: Duration::from_secs(self.fetch.timeout_secs),
        }
    }
}
