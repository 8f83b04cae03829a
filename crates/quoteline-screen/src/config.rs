//! Region configuration: field mapping, threshold rules, request template.
//!
//! The config document is keyed by region; each region holds three groups in
//! order (field indices, thresholds, urls). Entries whose `valid` flag is not
//! `true` are dropped while parsing, so everything downstream only ever sees
//! active entries.
//!
//! ```json
//! { "CN": {
//!     "interestInfoIdxs": { "stockCode": { "index": 2, "valid": true }, ... },
//!     "thresholds": { "turnOverRate": { "lower": 5, "upper": 10, "valid": true } },
//!     "urls": {
//!       "request": { "prefix": "...", "suffix": "...", "headers": {}, "valid": true },
//!       "firewallWarning": { "text": "...", "valid": true } } } }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use quoteline_core::RetryPolicy;
use quoteline_core::http::DEFAULT_REQUEST_TIMEOUT;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Column conventionally holding the instrument code
pub const DEFAULT_IDENTIFIER_FIELD: &str = "stockCode";

// =============================================================================
// Field mapping
// =============================================================================

/// One output column and where it sits in the upstream quote array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub index: usize,
}

/// Ordered projection from the upstream positional array to named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    fields: Vec<FieldSpec>,
    id_position: usize,
}

impl FieldMapping {
    /// Build from active fields in output order.
    ///
    /// Fails when names repeat, the list is empty, or `identifier_field`
    /// is not one of the fields.
    pub fn new(fields: Vec<FieldSpec>, identifier_field: &str) -> Result<Self, ConfigError> {
        if fields.is_empty() {
            return Err(ConfigError::Invalid("field mapping has no valid fields".into()));
        }
        let mut seen = HashSet::new();
        for f in &fields {
            if !seen.insert(f.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate field '{}'", f.name)));
            }
        }
        let id_position = fields
            .iter()
            .position(|f| f.name == identifier_field)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "identifier field '{identifier_field}' is not in the field mapping"
                ))
            })?;
        Ok(Self {
            fields,
            id_position,
        })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Column names in output order
    pub fn columns(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Position of the identifier column within the output
    pub fn id_position(&self) -> usize {
        self.id_position
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// Threshold rules
// =============================================================================

/// Numeric range predicate on one field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThresholdRule {
    #[serde(skip)]
    pub field: String,
    #[serde(default = "neg_infinity")]
    pub lower: f64,
    #[serde(default = "pos_infinity")]
    pub upper: f64,
    #[serde(default)]
    pub valid: bool,
}

fn neg_infinity() -> f64 {
    f64::NEG_INFINITY
}

fn pos_infinity() -> f64 {
    f64::INFINITY
}

impl ThresholdRule {
    pub fn new(field: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            field: field.into(),
            lower,
            upper,
            valid: true,
        }
    }

    /// Same rule, excluded from evaluation
    pub fn disabled(mut self) -> Self {
        self.valid = false;
        self
    }
}

/// Ordered set of threshold rules; only `valid` ones take part in filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdRules {
    rules: Vec<ThresholdRule>,
}

impl ThresholdRules {
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        Self { rules }
    }

    pub fn active(&self) -> impl Iterator<Item = &ThresholdRule> {
        self.rules.iter().filter(|r| r.valid)
    }

    pub fn all(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }
}

impl FromIterator<ThresholdRule> for ThresholdRules {
    fn from_iter<I: IntoIterator<Item = ThresholdRule>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Whether a rule's upper bound admits equality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundsMode {
    /// `lower <= v < upper`
    #[default]
    HalfOpen,
    /// `lower <= v <= upper`
    Closed,
}

impl BoundsMode {
    pub fn admits(self, lower: f64, upper: f64, value: f64) -> bool {
        match self {
            Self::HalfOpen => lower <= value && value < upper,
            Self::Closed => lower <= value && value <= upper,
        }
    }
}

impl std::fmt::Display for BoundsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HalfOpen => f.write_str("half-open [lower, upper)"),
            Self::Closed => f.write_str("closed [lower, upper]"),
        }
    }
}

// =============================================================================
// Request template
// =============================================================================

/// How to build the quote URL and recognize a firewall interstitial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    pub prefix: String,
    pub suffix: String,
    pub headers: Vec<(String, String)>,
    pub firewall_marker: String,
}

impl RequestTemplate {
    pub fn url_for(&self, identifier: &str) -> String {
        format!("{}{identifier}{}", self.prefix, self.suffix)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::Invalid("request prefix is empty".into()));
        }
        if self.firewall_marker.is_empty() {
            return Err(ConfigError::Invalid("firewall warning text is empty".into()));
        }
        Ok(())
    }

    /// Parse the (already `valid`-filtered) urls group.
    fn from_group(urls: &Map<String, Value>) -> Result<Self, ConfigError> {
        let request = urls
            .get("request")
            .and_then(Value::as_object)
            .ok_or_else(|| ConfigError::MissingKey("urls.request".into()))?;
        let prefix = required_str(request, "prefix", "urls.request.prefix")?;
        let suffix = required_str(request, "suffix", "urls.request.suffix")?;
        let headers = match request.get("headers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, value)| {
                    value
                        .as_str()
                        .map(|v| (name.clone(), v.to_string()))
                        .ok_or_else(|| {
                            ConfigError::Invalid(format!("header '{name}' is not a string"))
                        })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "urls.request.headers must be an object".into(),
                ));
            }
        };
        let firewall = urls
            .get("firewallWarning")
            .and_then(Value::as_object)
            .ok_or_else(|| ConfigError::MissingKey("urls.firewallWarning".into()))?;
        let firewall_marker = required_str(firewall, "text", "urls.firewallWarning.text")?;

        let template = Self {
            prefix,
            suffix,
            headers,
            firewall_marker,
        };
        template.validate()?;
        Ok(template)
    }
}

fn required_str(map: &Map<String, Value>, key: &str, path: &str) -> Result<String, ConfigError> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingKey(path.into()))
}

// =============================================================================
// Region config
// =============================================================================

/// The three validated groups for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionConfig {
    pub mapping: FieldMapping,
    pub rules: ThresholdRules,
    pub template: RequestTemplate,
}

impl RegionConfig {
    pub fn from_file(
        path: &Path,
        region: &str,
        identifier_field: &str,
    ) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config = Self::from_json_str(&text, region, identifier_field)?;
        log::info!(
            "Loaded region {region} from {}: {} fields, {} active rules",
            path.display(),
            config.mapping.len(),
            config.rules.active().count()
        );
        Ok(config)
    }

    pub fn from_json_str(
        text: &str,
        region: &str,
        identifier_field: &str,
    ) -> Result<Self, ConfigError> {
        let doc: Value = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let groups = doc
            .get(region)
            .and_then(Value::as_object)
            .filter(|g| !g.is_empty())
            .ok_or_else(|| ConfigError::MissingRegion(region.to_string()))?;

        let groups: Vec<&Value> = groups.values().collect();
        if groups.len() < 3 {
            return Err(ConfigError::MissingGroups {
                region: region.to_string(),
                found: groups.len(),
            });
        }

        let fields = valid_entries(groups[0], "field mapping")?;
        let thresholds = valid_entries(groups[1], "thresholds")?;
        let urls = valid_entries(groups[2], "urls")?;

        let specs = fields
            .into_iter()
            .map(|(name, entry)| {
                let index = entry
                    .get("index")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ConfigError::MissingKey(format!("{name}.index")))?;
                Ok(FieldSpec {
                    name: name.clone(),
                    index: index as usize,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let mapping = FieldMapping::new(specs, identifier_field)?;

        let rules = thresholds
            .into_iter()
            .map(|(name, entry)| {
                let mut rule: ThresholdRule = serde_json::from_value(Value::Object(entry.clone()))
                    .map_err(|e| ConfigError::Invalid(format!("threshold '{name}': {e}")))?;
                rule.field = name.clone();
                Ok(rule)
            })
            .collect::<Result<ThresholdRules, ConfigError>>()?;

        let url_map: Map<String, Value> = urls
            .into_iter()
            .map(|(k, v)| (k.clone(), Value::Object(v.clone())))
            .collect();
        let template = RequestTemplate::from_group(&url_map)?;

        Ok(Self {
            mapping,
            rules,
            template,
        })
    }
}

/// Entries of a group whose `valid` flag is `true`, in document order.
fn valid_entries<'a>(
    group: &'a Value,
    label: &str,
) -> Result<Vec<(&'a String, &'a Map<String, Value>)>, ConfigError> {
    let group = group
        .as_object()
        .ok_or_else(|| ConfigError::Invalid(format!("{label} group is not an object")))?;
    Ok(group
        .iter()
        .filter_map(|(k, v)| v.as_object().map(|o| (k, o)))
        .filter(|(_, o)| o.get("valid").and_then(Value::as_bool).unwrap_or(false))
        .collect())
}

// =============================================================================
// Batch options
// =============================================================================

/// Knobs for one fetch batch. Immutable once handed to the fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// In-flight request cap (admission slots)
    pub concurrency_limit: usize,
    /// Worker threads pulling identifiers; may exceed the slot count
    pub workers: usize,
    pub retry: RetryPolicy,
    /// `true`: collect what succeeded; `false`: abort on first failure
    pub allow_partial_results: bool,
    pub request_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 5,
            workers: 8,
            retry: RetryPolicy::default(),
            allow_partial_results: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Invalid("concurrency limit must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("worker count must be at least 1".into()));
        }
        Ok(())
    }
}
