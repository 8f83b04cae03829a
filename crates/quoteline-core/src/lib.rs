//! Quoteline Core - Common infrastructure for quote fetching pipelines
//!
//! Transport, admission control, retry, progress and logging shared by the
//! screening crate and the CLI.

pub mod admission;
pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod work_queue;

// Re-exports for convenience
pub use admission::{AdmissionGate, Slot};
pub use error::FetchError;
pub use http::{HttpResponse, ReqwestTransport, SHARED_RUNTIME, Transport};
pub use logging::{ProgressAwareLogger, init_logging};
pub use progress::{
    CompletionCounter, ProgressContext, ProgressObserver, SharedProgress, fmt_num,
};
pub use retry::{Attempted, RetryPolicy, retry_with_backoff};
pub use shutdown::{
    AbortFlag, is_shutdown_requested, should_stop, shutdown_flag,
};
pub use work_queue::WorkQueue;
