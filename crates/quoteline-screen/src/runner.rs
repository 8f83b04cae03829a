//! Batch orchestration: one bounded-concurrency fetch per identifier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use quoteline_core::{
    AbortFlag, AdmissionGate, CompletionCounter, FetchError, ProgressObserver, ReqwestTransport,
    Transport, WorkQueue, should_stop,
};

use crate::config::{BatchOptions, RegionConfig};
use crate::error::{BatchError, ConfigError};
use crate::record::{NormalizedRecord, Snapshot};
use crate::stats::BatchSummary;
use crate::worker::{self, FetchContext, Outcome};

/// How a batch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    /// Every identifier was attempted (or the process is shutting down);
    /// failed identifiers are simply absent.
    Complete(Snapshot),
    /// Fail-fast mode hit its first soft failure.
    Aborted { identifier: String, reason: FetchError },
}

/// Result of one [`QuoteFetcher::fetch`] call.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub summary: BatchSummary,
    /// Soft failures in input order
    pub failures: Vec<(String, FetchError)>,
}

impl BatchReport {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match &self.status {
            BatchStatus::Complete(snapshot) => Some(snapshot),
            BatchStatus::Aborted { .. } => None,
        }
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self.status {
            BatchStatus::Complete(snapshot) => Some(snapshot),
            BatchStatus::Aborted { .. } => None,
        }
    }
}

/// Fetch orchestrator for one region.
///
/// Configuration is validated once here; [`fetch`](Self::fetch) never fails
/// on configuration.
#[derive(Debug, Clone)]
pub struct QuoteFetcher {
    region: RegionConfig,
    options: BatchOptions,
    columns: Arc<[String]>,
}

impl QuoteFetcher {
    pub fn new(region: RegionConfig, options: BatchOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        region.template.validate()?;
        let columns = Arc::from(region.mapping.columns());
        Ok(Self {
            region,
            options,
            columns,
        })
    }

    pub fn region(&self) -> &RegionConfig {
        &self.region
    }

    /// Run one batch over HTTP. The client lives for this call only.
    pub fn fetch(
        &self,
        identifiers: &[String],
        observer: Option<ProgressObserver>,
    ) -> Result<BatchReport, BatchError> {
        if identifiers.is_empty() {
            return Ok(self.empty_report());
        }
        let transport = ReqwestTransport::new(self.options.request_timeout)
            .map_err(|e| BatchError::Client(e.to_string()))?;
        self.fetch_with(&transport, identifiers, observer)
    }

    /// Run one batch over the given transport.
    pub fn fetch_with(
        &self,
        transport: &dyn Transport,
        identifiers: &[String],
        observer: Option<ProgressObserver>,
    ) -> Result<BatchReport, BatchError> {
        if identifiers.is_empty() {
            return Ok(self.empty_report());
        }

        let start = Instant::now();
        let total = identifiers.len();
        let allow_partial = self.options.allow_partial_results;
        log::info!(
            "Fetching {total} quotes: concurrency={}, workers={}, retries={}, mode={}",
            self.options.concurrency_limit,
            self.options.workers,
            self.options.retry.max_retries,
            if allow_partial { "partial" } else { "fail-fast" }
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .thread_name(|i| format!("quote-worker-{i}"))
            .build()
            .map_err(|e| BatchError::ThreadPool(e.to_string()))?;

        let queue = WorkQueue::new(identifiers);
        let gate = AdmissionGate::new(self.options.concurrency_limit);
        let abort: AbortFlag = Arc::new(AtomicBool::new(false));
        let counter = CompletionCounter::new(total, observer);
        let ctx = FetchContext {
            transport,
            template: &self.region.template,
            mapping: &self.region.mapping,
            columns: self.columns.clone(),
            retry: self.options.retry,
            gate: &gate,
            stop: &abort,
        };

        let records: Mutex<Vec<(usize, NormalizedRecord)>> = Mutex::new(Vec::new());
        let failures: Mutex<Vec<(usize, FetchError)>> = Mutex::new(Vec::new());
        let first_failure: Mutex<Option<(usize, FetchError)>> = Mutex::new(None);
        let retries = Mutex::new(0u32);

        pool.scope(|s| {
            for _ in 0..self.options.workers {
                s.spawn(|_| {
                    while !should_stop(&abort) {
                        let Some((idx, identifier)) = queue.next() else {
                            break;
                        };
                        let fetched = worker::fetch_one(&ctx, identifier);
                        *retries.lock().expect("worker thread panicked") += fetched.retries;
                        match fetched.outcome {
                            Outcome::Fetched(record) => {
                                records
                                    .lock()
                                    .expect("worker thread panicked")
                                    .push((idx, record));
                            }
                            Outcome::Failed(err) => {
                                log::warn!("{identifier}: {err}");
                                if !allow_partial {
                                    let mut first =
                                        first_failure.lock().expect("worker thread panicked");
                                    if first.is_none() {
                                        *first = Some((idx, err.clone()));
                                        abort.store(true, Ordering::Relaxed);
                                    }
                                }
                                failures
                                    .lock()
                                    .expect("worker thread panicked")
                                    .push((idx, err));
                            }
                            Outcome::Skipped => continue,
                        }
                        counter.tick();
                    }
                });
            }
        });

        let mut records = records.into_inner().expect("worker thread panicked");
        records.sort_by_key(|(idx, _)| *idx);
        let mut failures = failures.into_inner().expect("worker thread panicked");
        failures.sort_by_key(|(idx, _)| *idx);

        let summary = BatchSummary {
            requested: total,
            succeeded: records.len(),
            soft_failed: failures.len(),
            skipped: total - records.len() - failures.len(),
            retries: retries.into_inner().expect("worker thread panicked"),
            peak_in_flight: gate.peak(),
            elapsed: start.elapsed(),
        };
        let failures = failures
            .into_iter()
            .map(|(idx, err)| (identifiers[idx].clone(), err))
            .collect();

        let status = match first_failure.into_inner().expect("worker thread panicked") {
            Some((idx, reason)) => {
                log::error!(
                    "Batch aborted at {}: {reason} ({} skipped)",
                    identifiers[idx],
                    summary.skipped
                );
                BatchStatus::Aborted {
                    identifier: identifiers[idx].clone(),
                    reason,
                }
            }
            None => {
                let records = records.into_iter().map(|(_, r)| r).collect();
                BatchStatus::Complete(Snapshot::new(
                    self.columns.clone(),
                    self.region.mapping.id_position(),
                    records,
                ))
            }
        };

        log::info!(
            "Batch finished: {}/{} fetched, {} failed, {} skipped in {:.1}s",
            summary.succeeded,
            summary.requested,
            summary.soft_failed,
            summary.skipped,
            summary.elapsed.as_secs_f64()
        );

        Ok(BatchReport {
            status,
            summary,
            failures,
        })
    }

    fn empty_report(&self) -> BatchReport {
        log::info!("No identifiers to fetch");
        BatchReport {
            status: BatchStatus::Complete(Snapshot::empty(
                self.columns.clone(),
                self.region.mapping.id_position(),
            )),
            summary: BatchSummary::default(),
            failures: Vec::new(),
        }
    }
}
