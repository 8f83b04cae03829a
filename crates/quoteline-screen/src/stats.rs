//! Batch statistics and their console rendering.

use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use quoteline_core::fmt_num;

/// Counters for one fetch batch.
///
/// `requested == succeeded + soft_failed + skipped` once the batch returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub soft_failed: usize,
    /// Never attempted because the batch was stopped
    pub skipped: usize,
    /// Backoff waits across all identifiers
    pub retries: u32,
    /// Most requests ever in flight at once
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Format summary table as a string.
    pub fn format_table(&self, title: &str) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(title)
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Requested"),
            Cell::new(fmt_num(self.requested)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Succeeded").fg(Color::Green),
            Cell::new(fmt_num(self.succeeded)).fg(Color::Green),
            Cell::new(format!("{:.1}", pct(self.succeeded, self.requested))).fg(Color::Green),
        ]);
        let failed = Cell::new(fmt_num(self.soft_failed));
        table.add_row(vec![
            Cell::new("Soft failures"),
            if self.soft_failed > 0 { failed.fg(Color::Yellow) } else { failed },
            Cell::new(format!("{:.1}", pct(self.soft_failed, self.requested))),
        ]);
        if self.skipped > 0 {
            table.add_row(vec![
                Cell::new("Skipped").fg(Color::Red),
                Cell::new(fmt_num(self.skipped)).fg(Color::Red),
                Cell::new(format!("{:.1}", pct(self.skipped, self.requested))),
            ]);
        }
        table.add_row(vec![
            Cell::new("Retries"),
            Cell::new(self.retries.to_string()),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Peak in flight"),
            Cell::new(self.peak_in_flight.to_string()),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
            Cell::new(""),
        ]);

        format!("\n{table}")
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!(
            "Batch complete: {}/{} fetched, {} failed, {} skipped, {} retries [{:.1}s]",
            fmt_num(self.succeeded),
            fmt_num(self.requested),
            fmt_num(self.soft_failed),
            fmt_num(self.skipped),
            self.retries,
            self.elapsed.as_secs_f64()
        );
    }
}

/// Calculate percentage safely.
fn pct(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
