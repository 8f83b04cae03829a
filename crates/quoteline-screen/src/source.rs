//! Identifier list loading.

use std::io::Read;
use std::path::Path;

use crate::error::ConfigError;

/// Exchange prefix for a bare six-digit A/B-share code.
pub fn exchange_prefix(code: &str) -> Option<&'static str> {
    const SHANGHAI: [&str; 3] = ["60", "688", "900"];
    const SHENZHEN: [&str; 3] = ["00", "300", "200"];
    if SHANGHAI.iter().any(|p| code.starts_with(p)) {
        Some("sh")
    } else if SHENZHEN.iter().any(|p| code.starts_with(p)) {
        Some("sz")
    } else {
        None
    }
}

/// Exchange-qualified identifier, or `None` when the exchange is unknown.
///
/// Codes that already carry an `sh`/`sz` prefix pass through.
pub fn qualify(code: &str) -> Option<String> {
    let code = code.trim();
    if code.starts_with("sh") || code.starts_with("sz") {
        return Some(code.to_string());
    }
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    exchange_prefix(code).map(|prefix| format!("{prefix}{code}"))
}

/// Read identifiers from the first column of a headerless CSV.
pub fn load_identifiers(path: &Path) -> Result<Vec<String>, ConfigError> {
    let file = std::fs::File::open(path)
        .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
    let ids = read_identifiers(file)?;
    log::info!("Loaded {} identifiers from {}", ids.len(), path.display());
    Ok(ids)
}

/// [`load_identifiers`] over any reader. Blank rows are ignored; codes
/// with an unknown exchange are skipped with a warning.
pub fn read_identifiers<R: Read>(reader: R) -> Result<Vec<String>, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut ids = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| ConfigError::Parse(format!("identifier file: {e}")))?;
        let Some(code) = row.get(0).map(|c| c.trim_start_matches('\u{feff}')) else {
            continue;
        };
        if code.is_empty() {
            continue;
        }
        match qualify(code) {
            Some(id) => ids.push(id),
            None => log::warn!("Skipping '{code}' (row {}): unknown exchange", line + 1),
        }
    }
    Ok(ids)
}
