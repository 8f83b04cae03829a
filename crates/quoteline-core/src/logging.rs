//! Logging setup: env_logger filtering, printed through indicatif when a
//! progress bar is on screen.

use indicatif::MultiProgress;

/// Padded label and optional ANSI color for a level.
fn level_label(level: log::Level, color: bool) -> String {
    let (label, ansi) = match level {
        log::Level::Error => ("ERROR", "\x1b[31m"),
        log::Level::Warn => ("WARN ", "\x1b[33m"),
        log::Level::Info => ("INFO ", "\x1b[32m"),
        log::Level::Debug => ("DEBUG", "\x1b[36m"),
        log::Level::Trace => ("TRACE", "\x1b[35m"),
    };
    if color {
        format!("{ansi}{label}\x1b[0m")
    } else {
        label.to_string()
    }
}

/// Logger that prints above the progress bars instead of through them.
pub struct ProgressAwareLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl ProgressAwareLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for ProgressAwareLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}", level_label(record.level(), true), record.args());
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Default filter: `debug` wins over `quiet`; `RUST_LOG` overrides both.
fn default_filter(quiet: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Initialize logging; pass the `MultiProgress` when running on a TTY.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or(default_filter(quiet, debug));

    match multi {
        Some(multi) => {
            let logger = env_logger::Builder::from_env(env).build();
            let max_level = logger.filter();
            if log::set_boxed_logger(Box::new(ProgressAwareLogger::new(logger, multi.clone())))
                .is_ok()
            {
                log::set_max_level(max_level);
            }
        }
        None => {
            // Non-TTY: no ANSI colors, plain labels for log aggregation
            let _ = env_logger::Builder::from_env(env)
                .format(|buf, record| {
                    writeln!(buf, "[{}] {}", level_label(record.level(), false), record.args())
                })
                .try_init();
        }
    }
}
