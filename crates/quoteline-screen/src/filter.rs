//! Threshold filter: conjunction of numeric range predicates over a snapshot.

use crate::config::{BoundsMode, ThresholdRule, ThresholdRules};
use crate::error::SchemaError;
use crate::record::{FieldValue, NormalizedRecord, Snapshot};

/// Pure, order-preserving filter. The bounds mode is fixed per engine.
#[derive(Debug, Clone, Default)]
pub struct ThresholdFilter {
    rules: ThresholdRules,
    bounds: BoundsMode,
}

impl ThresholdFilter {
    pub fn new(rules: ThresholdRules, bounds: BoundsMode) -> Self {
        Self { rules, bounds }
    }

    pub fn bounds(&self) -> BoundsMode {
        self.bounds
    }

    /// Records satisfying every active rule, in snapshot order.
    ///
    /// With no active rules the snapshot comes back unchanged.
    pub fn apply(&self, snapshot: &Snapshot) -> Result<Snapshot, SchemaError> {
        let active = self.check_schema(snapshot)?;
        if active.is_empty() {
            return Ok(snapshot.clone());
        }
        let records = snapshot
            .iter()
            .filter(|rec| active.iter().all(|rule| self.admits(rule, rec)))
            .cloned()
            .collect();
        Ok(Snapshot::new(
            snapshot.shared_columns(),
            snapshot.id_position(),
            records,
        ))
    }

    /// Identifiers of matching records, in snapshot order.
    pub fn matching_identifiers(&self, snapshot: &Snapshot) -> Result<Vec<String>, SchemaError> {
        let active = self.check_schema(snapshot)?;
        Ok(snapshot
            .iter()
            .filter(|rec| active.iter().all(|rule| self.admits(rule, rec)))
            .map(NormalizedRecord::identifier)
            .collect())
    }

    fn check_schema(&self, snapshot: &Snapshot) -> Result<Vec<&ThresholdRule>, SchemaError> {
        let active: Vec<&ThresholdRule> = self.rules.active().collect();
        if let Some(rule) = active.iter().find(|r| !snapshot.has_column(&r.field)) {
            return Err(SchemaError::UnknownField(rule.field.clone()));
        }
        Ok(active)
    }

    // Text and NaN never satisfy a rule
    fn admits(&self, rule: &ThresholdRule, record: &NormalizedRecord) -> bool {
        match record.get(&rule.field) {
            Some(FieldValue::Number(v)) if !v.is_nan() => {
                self.bounds.admits(rule.lower, rule.upper, *v)
            }
            _ => false,
        }
    }
}
