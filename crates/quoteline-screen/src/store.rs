//! Snapshot store: the single table shared across batches and readers.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::config::{BoundsMode, ThresholdRules};
use crate::error::SchemaError;
use crate::filter::ThresholdFilter;
use crate::record::{NormalizedRecord, Snapshot};
use crate::table::render_table;

/// Result of a point lookup: matching rows plus their rendered table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookup {
    pub records: Vec<NormalizedRecord>,
    /// Empty when nothing matched
    pub table: String,
}

impl Lookup {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Holds the current [`Snapshot`] behind an atomic swap.
///
/// Readers clone the `Arc` and never observe a half-replaced table.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    bounds: BoundsMode,
}

impl SnapshotStore {
    pub fn new(bounds: BoundsMode) -> Self {
        Self::with_snapshot(Snapshot::default(), bounds)
    }

    pub fn with_snapshot(snapshot: Snapshot, bounds: BoundsMode) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            bounds,
        }
    }

    /// The snapshot held right now.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().expect("snapshot lock poisoned").clone()
    }

    /// Swap in a new snapshot wholesale; the previous one is dropped once
    /// its last reader lets go.
    pub fn replace(&self, snapshot: Snapshot) {
        let rows = snapshot.len();
        let next = Arc::new(snapshot);
        *self.current.write().expect("snapshot lock poisoned") = next;
        log::info!(
            "Snapshot replaced at {}: {rows} records",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
    }

    /// Rows whose identifier is in `identifiers`, in snapshot order.
    pub fn lookup<I, S>(&self, identifiers: I) -> Lookup
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: HashSet<String> = identifiers
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        let snapshot = self.current();
        let records: Vec<NormalizedRecord> = snapshot
            .iter()
            .filter(|rec| wanted.contains(&rec.identifier()))
            .cloned()
            .collect();
        if records.is_empty() {
            log::debug!("Lookup matched nothing ({} requested)", wanted.len());
            return Lookup::default();
        }
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|rec| rec.values().iter().map(ToString::to_string).collect())
            .collect();
        let table = render_table(snapshot.columns(), &rows);
        Lookup { records, table }
    }

    /// Identifiers in the current snapshot that pass every active rule.
    pub fn query_by_thresholds(&self, rules: &ThresholdRules) -> Result<Vec<String>, SchemaError> {
        let filter = ThresholdFilter::new(rules.clone(), self.bounds);
        filter.matching_identifiers(&self.current())
    }

    pub fn bounds(&self) -> BoundsMode {
        self.bounds
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(BoundsMode::default())
    }
}
