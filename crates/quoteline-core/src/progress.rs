//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif bar per batch (cleared on completion).
//! Non-TTY mode: log-based output (no progress bars).
//!
//! [`CompletionCounter`] is the batch-side half: workers tick it once per
//! finished identifier and it forwards a percentage to an optional observer.

use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Callback receiving completion percentage in `[0, 100]`.
pub type ProgressObserver = Box<dyn FnMut(f64) + Send>;

/// Shared completion counter for one batch.
///
/// The increment and the observer call happen under one lock, so observers
/// see a non-decreasing sequence even when workers finish out of order.
pub struct CompletionCounter {
    total: usize,
    completed: AtomicUsize,
    observer: Mutex<Option<ProgressObserver>>,
}

impl CompletionCounter {
    pub fn new(total: usize, observer: Option<ProgressObserver>) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            observer: Mutex::new(observer),
        }
    }

    /// Record one finished item and notify the observer.
    pub fn tick(&self) -> usize {
        let mut observer = self.observer.lock().expect("progress observer panicked");
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(cb) = observer.as_mut() {
            cb(percent(done, self.total));
        }
        done
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl std::fmt::Debug for CompletionCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionCounter")
            .field("total", &self.total)
            .field("completed", &self.completed())
            .finish_non_exhaustive()
    }
}

/// `done / total * 100`, clamped; an empty batch is complete.
fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).min(100.0)
}

/// Batch bar: percent-based so it can be driven straight from an observer
fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<12.dim} {bar:30.green/dim} {pos:>3}% {elapsed:>4} {wide_msg:.dim}")
        .expect("invalid template")
        .progress_chars("--")
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Create a 0–100 bar for one fetch batch.
    ///
    /// Non-TTY: hidden (no-op).
    pub fn batch_bar(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(100));
        pb.set_style(bar_style());
        pb.set_prefix(name.to_string());
        pb
    }

    /// Observer that drives `pb` from completion percentages.
    ///
    /// In non-TTY mode every tenth percent is logged instead.
    pub fn observer_for(&self, pb: ProgressBar) -> ProgressObserver {
        let is_tty = self.is_tty;
        let mut last_logged = 0u64;
        Box::new(move |pct: f64| {
            let pos = pct.floor() as u64;
            pb.set_position(pos);
            if !is_tty && pos >= last_logged + 10 {
                last_logged = pos - pos % 10;
                log::info!("progress: {pct:.1}%");
            }
        })
    }

    /// Print a line above managed progress bars (avoids interference).
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Whether running in TTY mode.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_small() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(123), "123");
    }

    #[test]
    fn fmt_num_thousands() {
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(123_456), "123,456");
        assert_eq!(fmt_num(1_234_567), "1,234,567");
    }

    #[test]
    fn percent_of_empty_batch_is_complete() {
        assert_eq!(percent(0, 0), 100.0);
    }

    #[test]
    fn counter_reports_percentages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let counter = CompletionCounter::new(
            4,
            Some(Box::new(move |p: f64| sink.lock().unwrap().push(p))),
        );
        for _ in 0..4 {
            counter.tick();
        }
        assert_eq!(*seen.lock().unwrap(), vec![25.0, 50.0, 75.0, 100.0]);
        assert_eq!(counter.completed(), 4);
    }

    #[test]
    fn counter_without_observer_still_counts() {
        let counter = CompletionCounter::new(2, None);
        assert_eq!(counter.tick(), 1);
        assert_eq!(counter.tick(), 2);
    }

    #[test]
    fn concurrent_ticks_are_monotonic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let counter = CompletionCounter::new(
            400,
            Some(Box::new(move |p: f64| sink.lock().unwrap().push(p))),
        );
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        counter.tick();
                    }
                });
            }
        });
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 400);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100.0);
    }
}
