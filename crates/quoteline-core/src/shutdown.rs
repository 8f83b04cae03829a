//! Stop signals: the process-wide shutdown flag and per-batch abort flags

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag, set by the SIGTERM/SIGINT handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Batch-scoped stop flag, raised by the first terminal failure in
/// fail-fast mode. Workers stop claiming new work once it is set.
pub type AbortFlag = Arc<AtomicBool>;

/// True when either this batch was aborted or the process is shutting down.
pub fn should_stop(abort: &AtomicBool) -> bool {
    abort.load(Ordering::Relaxed) || is_shutdown_requested()
}
