use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use quoteline_core::{FetchError, HttpResponse, RetryPolicy, Transport};
use quoteline_screen::{
    BatchOptions, BatchStatus, BoundsMode, CsvSink, DEFAULT_IDENTIFIER_FIELD, FieldValue,
    PersistenceSink, QuoteFetcher, RegionConfig, SchemaError, Snapshot, SnapshotStore,
    ThresholdFilter, ThresholdRule, ThresholdRules,
};

const PREFIX: &str = "http://quotes.test/q=";

const REGION: &str = r#"{
    "CN": {
        "interestInfoIdxs": {
            "stockName":    { "index": 1, "valid": true },
            "stockCode":    { "index": 2, "valid": true },
            "currentPrice": { "index": 3, "valid": true },
            "turnOverRate": { "index": 4, "valid": true },
            "marketCap":    { "index": 5, "valid": true },
            "peRatio":      { "index": 6, "valid": false }
        },
        "thresholds": {
            "turnOverRate": { "lower": 5, "upper": 10, "valid": true },
            "marketCap":    { "lower": 50, "upper": 120, "valid": true }
        },
        "urls": {
            "request": { "prefix": "http://quotes.test/q=", "suffix": "", "headers": {}, "valid": true },
            "firewallWarning": { "text": "Access denied by firewall", "valid": true }
        }
    }
}"#;

// =============================================================================
// Scripted transport
// =============================================================================

#[derive(Clone)]
enum Reply {
    Quote { turnover: f64, cap: f64 },
    Status(u16),
    Body(String),
    Broken,
}

/// In-memory upstream: per-identifier reply queues, last reply repeats.
struct Scripted {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallback: Reply,
    delay: Duration,
    delays: HashMap<String, Duration>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Scripted {
    fn new(fallback: Reply) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            delay: Duration::ZERO,
            delays: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_delay_for(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    fn script(self, id: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), replies.into());
        self
    }

    fn calls(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn next_reply(&self, id: &str) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| self.fallback.clone()),
            None => self.fallback.clone(),
        }
    }
}

fn quote_body(id: &str, turnover: f64, cap: f64) -> String {
    let code = id.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    format!(
        r#"{{"data":{{"{id}":{{"qt":{{"{id}":["1","浦发银行","{code}","7.50","{turnover}","{cap}","4.2"]}}}}}}}}"#
    )
}

impl Transport for Scripted {
    fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<HttpResponse, FetchError> {
        let id = url.strip_prefix(PREFIX).expect("unexpected url").to_string();
        *self.calls.lock().unwrap().entry(id.clone()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delays.get(&id).copied().unwrap_or(self.delay));
        let reply = self.next_reply(&id);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Reply::Quote { turnover, cap } => Ok(HttpResponse::new(200, quote_body(&id, turnover, cap))),
            Reply::Status(status) => Ok(HttpResponse::new(status, "")),
            Reply::Body(body) => Ok(HttpResponse::new(200, body)),
            Reply::Broken => Err(FetchError::Transport("connection reset".into())),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn region() -> RegionConfig {
    RegionConfig::from_json_str(REGION, "CN", DEFAULT_IDENTIFIER_FIELD).unwrap()
}

fn options(concurrency: usize) -> BatchOptions {
    BatchOptions {
        concurrency_limit: concurrency,
        retry: RetryPolicy {
            max_retries: 3,
            backoff_unit: Duration::ZERO,
        },
        ..BatchOptions::default()
    }
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("sh{:06}", 600000 + i)).collect()
}

fn good() -> Reply {
    Reply::Quote {
        turnover: 7.5,
        cap: 80.0,
    }
}

fn identifiers(snapshot: &Snapshot) -> Vec<String> {
    snapshot.iter().map(|r| r.identifier()).collect()
}

// =============================================================================
// Fetch orchestration
// =============================================================================

#[test]
fn in_flight_requests_never_exceed_limit() {
    let transport = Scripted::new(good()).with_delay(Duration::from_millis(5));
    let fetcher = QuoteFetcher::new(region(), options(3)).unwrap();
    let input = ids(40);

    let report = fetcher.fetch_with(&transport, &input, None).unwrap();

    let max = transport.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=3).contains(&max), "max in flight = {max}");
    assert!(report.summary.peak_in_flight <= 3);
    let snapshot = report.snapshot().unwrap();
    assert_eq!(identifiers(snapshot), input);
    assert_eq!(report.summary.succeeded, 40);
}

#[test]
fn single_slot_serializes_requests() {
    let transport = Scripted::new(good()).with_delay(Duration::from_millis(2));
    let fetcher = QuoteFetcher::new(region(), options(1)).unwrap();
    fetcher.fetch_with(&transport, &ids(12), None).unwrap();
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
}

#[test]
fn progress_is_monotonic_and_ends_at_100() {
    let transport = Scripted::new(good()).with_delay(Duration::from_millis(1));
    let fetcher = QuoteFetcher::new(region(), options(4)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    fetcher
        .fetch_with(&transport, &ids(25), Some(Box::new(move |p: f64| sink.lock().unwrap().push(p))))
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 25);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(*seen.last().unwrap(), 100.0);
}

#[test]
fn empty_batch_reports_no_progress() {
    let transport = Scripted::new(good());
    let fetcher = QuoteFetcher::new(region(), options(2)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::<f64>::new()));
    let sink = seen.clone();

    let report = fetcher
        .fetch_with(&transport, &[], Some(Box::new(move |p: f64| sink.lock().unwrap().push(p))))
        .unwrap();

    assert!(report.snapshot().unwrap().is_empty());
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(transport.total_calls(), 0);
}

#[test]
fn forbidden_is_soft_failure_without_retry() {
    let transport = Scripted::new(good()).script("sh600001", vec![Reply::Status(403)]);
    let fetcher = QuoteFetcher::new(region(), options(2)).unwrap();

    let report = fetcher.fetch_with(&transport, &ids(3), None).unwrap();

    assert_eq!(identifiers(report.snapshot().unwrap()), vec!["sh600000", "sh600002"]);
    assert_eq!(transport.calls("sh600001"), 1);
    assert_eq!(report.summary.retries, 0);
    assert_eq!(report.summary.soft_failed, 1);
    assert_eq!(
        report.failures,
        vec![("sh600001".to_string(), FetchError::Blocked { status: 403 })]
    );
}

#[test]
fn transient_errors_are_retried_with_backoff() {
    let transport = Scripted::new(good()).script(
        "sh600000",
        vec![Reply::Broken, Reply::Broken, good()],
    );
    let mut opts = options(1);
    opts.retry.backoff_unit = Duration::from_millis(10);
    let fetcher = QuoteFetcher::new(region(), opts).unwrap();

    let start = Instant::now();
    let report = fetcher.fetch_with(&transport, &ids(1), None).unwrap();

    // 2 waits: 20ms + 40ms
    assert!(start.elapsed() >= Duration::from_millis(60));
    assert_eq!(identifiers(report.snapshot().unwrap()), vec!["sh600000"]);
    assert_eq!(transport.calls("sh600000"), 3);
    assert_eq!(report.summary.retries, 2);
}

#[test]
fn exhausted_retries_become_soft_failure() {
    let transport = Scripted::new(good()).script("sh600000", vec![Reply::Broken]);
    let fetcher = QuoteFetcher::new(region(), options(1)).unwrap();

    let report = fetcher.fetch_with(&transport, &ids(2), None).unwrap();

    assert_eq!(transport.calls("sh600000"), 4);
    assert_eq!(report.summary.retries, 3);
    assert_eq!(identifiers(report.snapshot().unwrap()), vec!["sh600001"]);
    assert!(report.failures[0].1.is_retryable());
}

#[test]
fn firewall_page_and_bad_status_are_classified() {
    let transport = Scripted::new(good())
        .script(
            "sh600000",
            vec![Reply::Body("<html>Access denied by firewall</html>".into())],
        )
        .script("sh600001", vec![Reply::Status(302)])
        .script("sh600002", vec![Reply::Status(500)])
        .script("sh600003", vec![Reply::Body(r#"{"data":{}}"#.into())]);
    let fetcher = QuoteFetcher::new(region(), options(2)).unwrap();

    let report = fetcher.fetch_with(&transport, &ids(5), None).unwrap();

    let kinds: Vec<&str> = report.failures.iter().map(|(_, e)| e.kind()).collect();
    assert_eq!(kinds, vec!["blocked", "redirected", "status", "malformed"]);
    assert_eq!(identifiers(report.snapshot().unwrap()), vec!["sh600004"]);
    assert_eq!(transport.total_calls(), 5);
}

#[test]
fn fail_fast_aborts_and_counts_skipped() {
    let transport = Scripted::new(good()).script("sh600002", vec![Reply::Status(403)]);
    let opts = BatchOptions {
        workers: 1,
        allow_partial_results: false,
        ..options(1)
    };
    let fetcher = QuoteFetcher::new(region(), opts).unwrap();

    let report = fetcher.fetch_with(&transport, &ids(10), None).unwrap();

    assert_eq!(
        report.status,
        BatchStatus::Aborted {
            identifier: "sh600002".into(),
            reason: FetchError::Blocked { status: 403 },
        }
    );
    assert!(report.snapshot().is_none());
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.soft_failed, 1);
    assert_eq!(report.summary.skipped, 7);
    assert_eq!(transport.total_calls(), 3);
}

#[test]
fn fail_fast_drains_in_flight_requests() {
    let transport = Scripted::new(good())
        .with_delay(Duration::from_millis(80))
        .with_delay_for("sh600000", Duration::from_millis(20))
        .script("sh600000", vec![Reply::Status(403)]);
    let opts = BatchOptions {
        workers: 4,
        allow_partial_results: false,
        ..options(4)
    };
    let fetcher = QuoteFetcher::new(region(), opts).unwrap();

    let report = fetcher.fetch_with(&transport, &ids(12), None).unwrap();

    assert!(matches!(
        &report.status,
        BatchStatus::Aborted { identifier, .. } if identifier == "sh600000"
    ));
    let summary = &report.summary;
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.soft_failed, 1);
    assert_eq!(summary.skipped, 8);
    assert_eq!(
        summary.requested,
        summary.succeeded + summary.soft_failed + summary.skipped
    );
    assert_eq!(transport.total_calls(), 4);
    for id in &ids(12)[4..] {
        assert_eq!(transport.calls(id), 0, "{id} requested after abort");
    }
}

#[test]
fn fail_fast_cancels_pending_retries() {
    let transport = Scripted::new(good())
        .script("sh600000", vec![Reply::Broken, good()])
        .script("sh600001", vec![Reply::Status(403)])
        .with_delay_for("sh600001", Duration::from_millis(20));
    let mut opts = BatchOptions {
        workers: 2,
        allow_partial_results: false,
        ..options(2)
    };
    opts.retry.backoff_unit = Duration::from_millis(500);
    let fetcher = QuoteFetcher::new(region(), opts).unwrap();

    let start = Instant::now();
    let report = fetcher.fetch_with(&transport, &ids(4), None).unwrap();

    assert_eq!(
        report.status,
        BatchStatus::Aborted {
            identifier: "sh600001".into(),
            reason: FetchError::Blocked { status: 403 },
        }
    );
    assert_eq!(transport.calls("sh600000"), 1);
    assert_eq!(report.summary.retries, 0);
    assert_eq!(report.summary.soft_failed, 2);
    assert_eq!(report.summary.skipped, 2);
    assert_eq!(transport.total_calls(), 2);
    // Backoff for sh600000 would have been 1s
    assert!(start.elapsed() < Duration::from_millis(800));
}

#[test]
fn duplicates_are_fetched_per_occurrence() {
    let transport = Scripted::new(good());
    let fetcher = QuoteFetcher::new(region(), options(2)).unwrap();
    let input = vec!["sz000001".to_string(), "sh600000".to_string(), "sz000001".to_string()];

    let report = fetcher.fetch_with(&transport, &input, None).unwrap();

    assert_eq!(identifiers(report.snapshot().unwrap()), input);
    assert_eq!(transport.calls("sz000001"), 2);
}

#[test]
fn records_are_normalized() {
    let transport = Scripted::new(good());
    let fetcher = QuoteFetcher::new(region(), options(1)).unwrap();

    let report = fetcher.fetch_with(&transport, &ids(1), None).unwrap();
    let snapshot = report.snapshot().unwrap();

    assert_eq!(
        snapshot.columns(),
        ["stockName", "stockCode", "currentPrice", "turnOverRate", "marketCap"]
    );
    let rec = &snapshot.records()[0];
    assert_eq!(rec.get("stockCode"), Some(&FieldValue::Text("sh600000".into())));
    assert_eq!(rec.get("stockName"), Some(&FieldValue::Text("浦发银行".into())));
    assert_eq!(rec.get("currentPrice"), Some(&FieldValue::Number(7.5)));
    assert!(rec.get("peRatio").is_none());
}

// =============================================================================
// Filtering and the store
// =============================================================================

fn screened_snapshot() -> Snapshot {
    let transport = Scripted::new(good()).script(
        "sh600001",
        vec![Reply::Quote {
            turnover: 2.0,
            cap: 80.0,
        }],
    );
    let fetcher = QuoteFetcher::new(region(), options(2)).unwrap();
    fetcher
        .fetch_with(&transport, &ids(2), None)
        .unwrap()
        .into_snapshot()
        .unwrap()
}

#[test]
fn region_rules_keep_in_range_rows() {
    let snapshot = screened_snapshot();
    let filter = ThresholdFilter::new(region().rules, BoundsMode::HalfOpen);
    let passed = filter.apply(&snapshot).unwrap();
    assert_eq!(identifiers(&passed), vec!["sh600000"]);
}

#[test]
fn no_active_rules_returns_input() {
    let snapshot = screened_snapshot();
    let filter = ThresholdFilter::new(ThresholdRules::default(), BoundsMode::HalfOpen);
    assert_eq!(filter.apply(&snapshot).unwrap(), snapshot);
}

#[test]
fn store_query_agrees_with_filter_export() {
    let snapshot = screened_snapshot();
    let rules = region().rules;
    let store = SnapshotStore::with_snapshot(snapshot, BoundsMode::HalfOpen);

    let exported = ThresholdFilter::new(rules.clone(), store.bounds())
        .apply(&store.current())
        .unwrap();

    assert_eq!(store.query_by_thresholds(&rules).unwrap(), identifiers(&exported));
    assert_eq!(identifiers(&exported), vec!["sh600000"]);
}

#[test]
fn store_lookup_and_query() {
    let store = SnapshotStore::new(BoundsMode::HalfOpen);
    let transport = Scripted::new(good());
    let fetcher = QuoteFetcher::new(region(), options(2)).unwrap();
    let input = vec!["sh600000".to_string(), "sz000001".to_string()];
    let report = fetcher.fetch_with(&transport, &input, None).unwrap();
    store.replace(report.into_snapshot().unwrap());

    let hit = store.lookup(["sh600000"]);
    assert_eq!(hit.len(), 1);
    assert!(hit.table.contains("浦发银行"));
    assert!(store.lookup(["nonexistent"]).is_empty());

    assert_eq!(
        store.query_by_thresholds(&region().rules).unwrap(),
        vec!["sh600000", "sz000001"]
    );
    let unknown = ThresholdRules::new(vec![ThresholdRule::new("peRatio", 0.0, 15.0)]);
    assert_eq!(
        store.query_by_thresholds(&unknown).unwrap_err(),
        SchemaError::UnknownField("peRatio".into())
    );
}

#[test]
fn replace_during_lookup_never_mixes_snapshots() {
    let fetcher = QuoteFetcher::new(region(), options(4)).unwrap();
    let input = ids(20);
    let build = |cap: f64| {
        let transport = Scripted::new(Reply::Quote { turnover: 7.5, cap });
        fetcher
            .fetch_with(&transport, &input, None)
            .unwrap()
            .into_snapshot()
            .unwrap()
    };
    let first = build(60.0);
    let second = build(90.0);
    let store = SnapshotStore::with_snapshot(first.clone(), BoundsMode::HalfOpen);

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..200 {
                store.replace(if i % 2 == 0 { second.clone() } else { first.clone() });
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..200 {
                    let found = store.lookup(&input);
                    assert_eq!(found.len(), 20);
                    let caps: Vec<_> = found
                        .records
                        .iter()
                        .map(|r| r.get("marketCap").and_then(FieldValue::as_number))
                        .collect();
                    assert!(caps.windows(2).all(|w| w[0] == w[1]), "mixed snapshot: {caps:?}");
                }
            });
        }
    });
}

#[test]
fn csv_sink_writes_fetched_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = screened_snapshot();

    let path = CsvSink::new(dir.path()).write(&snapshot, "stock").unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.trim_start_matches('\u{feff}').lines();
    assert_eq!(
        lines.next(),
        Some("stockName,stockCode,currentPrice,turnOverRate,marketCap")
    );
    assert_eq!(lines.next(), Some("浦发银行,sh600000,7.5,7.5,80"));
    assert_eq!(lines.next(), Some("浦发银行,sh600001,7.5,2,80"));
    assert_eq!(lines.next(), None);
}
