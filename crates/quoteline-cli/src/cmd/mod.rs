pub mod fetch;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

/// Print the effective settings on stderr
pub fn print_settings(config: &Config) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Region config",
        &config.input.config_file.display().to_string(),
    ]);
    table.add_row(vec!["Region", &config.input.region]);
    table.add_row(vec!["Identifier field", &config.input.identifier_field]);
    table.add_row(vec![
        "Codes file",
        &config.input.codes_file.display().to_string(),
    ]);
    table.add_row(vec![
        "Output directory",
        &config.output.dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Concurrency",
        &format!(
            "{} requests ({} workers)",
            config.fetch.concurrency, config.fetch.workers
        ),
    ]);
    table.add_row(vec!["Max retries", &config.fetch.max_retries.to_string()]);
    table.add_row(vec![
        "Backoff unit",
        &format!("{}ms", config.fetch.backoff_unit_ms),
    ]);
    table.add_row(vec![
        "Request timeout",
        &format!("{}s", config.fetch.timeout_secs),
    ]);
    table.add_row(vec![
        "On failure",
        if config.fetch.allow_partial_results {
            "keep partial results"
        } else {
            "abort batch"
        },
    ]);
    table.add_row(vec!["Threshold bounds", &config.screen.bounds.to_string()]);

    eprintln!("\n{table}");
}
