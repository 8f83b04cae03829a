//! Fatal errors of the screening pipeline.
//!
//! Per-identifier fetch failures are not here: they are soft and live in
//! [`quoteline_core::FetchError`].

/// Malformed or missing configuration, raised before any network I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Region key absent from the config document
    MissingRegion(String),
    /// Region has fewer than the three required groups
    MissingGroups { region: String, found: usize },
    /// A required key is missing or has the wrong type
    MissingKey(String),
    /// A present value is out of range or inconsistent
    Invalid(String),
    /// Config text is not valid JSON
    Parse(String),
    /// Config file could not be read
    Io(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRegion(region) => write!(f, "no configuration for region '{region}'"),
            Self::MissingGroups { region, found } => write!(
                f,
                "region '{region}' needs 3 groups (fields, thresholds, urls), found {found}"
            ),
            Self::MissingKey(key) => write!(f, "missing required key: {key}"),
            Self::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Parse(msg) => write!(f, "config is not valid JSON: {msg}"),
            Self::Io(msg) => write!(f, "cannot read config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A filter referenced a field the snapshot does not have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    UnknownField(String),
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(name) => write!(f, "unknown field '{name}'"),
        }
    }
}

impl std::error::Error for SchemaError {}

/// A batch could not be started at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// HTTP client construction failed
    Client(String),
    /// Worker pool construction failed
    ThreadPool(String),
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(msg) => write!(f, "cannot build HTTP client: {msg}"),
            Self::ThreadPool(msg) => write!(f, "cannot build worker pool: {msg}"),
        }
    }
}

impl std::error::Error for BatchError {}
