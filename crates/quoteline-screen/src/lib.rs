//! Quote screening: fetch a batch of quotes, hold them as a snapshot, filter
//! by threshold rules.
//!
//! ```text
//! identifiers + RegionConfig ─▶ QuoteFetcher ─▶ Snapshot ─▶ SnapshotStore
//!                                                              │
//!                                        lookup / query_by_thresholds / sink
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod filter;
pub mod record;
pub mod runner;
pub mod sink;
pub mod source;
pub mod stats;
pub mod store;
pub mod table;
mod worker;

pub use config::{
    BatchOptions, BoundsMode, DEFAULT_IDENTIFIER_FIELD, FieldMapping, FieldSpec, RegionConfig,
    RequestTemplate, ThresholdRule, ThresholdRules,
};
pub use error::{BatchError, ConfigError, SchemaError};
pub use filter::ThresholdFilter;
pub use record::{FieldValue, NormalizedRecord, Snapshot};
pub use runner::{BatchReport, BatchStatus, QuoteFetcher};
pub use sink::{CsvSink, PersistenceSink};
pub use stats::BatchSummary;
pub use store::{Lookup, SnapshotStore};
