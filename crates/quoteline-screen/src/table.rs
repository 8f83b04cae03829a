//! Plain-text table rendering for lookups.
//!
//! Column width is measured in terminal cells: East-Asian wide and
//! full-width characters count 2, everything else 1, so mixed-script
//! instrument names still line up.

use unicode_width::UnicodeWidthChar;

/// Display width of `text` in terminal cells.
pub fn display_width(text: &str) -> usize {
    text.chars().map(char_cells).sum()
}

fn char_cells(c: char) -> usize {
    match c {
        // East-Asian wide combining marks that unicode-width renders zero-width
        '\u{302A}'..='\u{302D}' | '\u{3099}'..='\u{309A}' | '\u{3164}' | '\u{16FE4}' => 2,
        _ if c.width() == Some(2) => 2,
        _ => 1,
    }
}

/// Render a `+---+` framed table with right-aligned cells.
///
/// Rows shorter than the header are padded with empty cells.
pub fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(col, name)| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .map(|cell| display_width(cell))
                .chain(std::iter::once(display_width(name)))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let border = {
        let mut line = String::from("+");
        for w in &widths {
            line.push_str(&"-".repeat(w + 2));
            line.push('+');
        }
        line
    };

    let format_row = |cells: &[String]| {
        let mut line = String::from("|");
        for (col, w) in widths.iter().enumerate() {
            let cell = cells.get(col).map(String::as_str).unwrap_or("");
            line.push(' ');
            line.push_str(&" ".repeat(w.saturating_sub(display_width(cell))));
            line.push_str(cell);
            line.push_str(" |");
        }
        line
    };

    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(border.clone());
    out.push(format_row(header));
    out.push(border.clone());
    for row in rows {
        out.push(format_row(row));
    }
    out.push(border);
    out.join("\n")
}
