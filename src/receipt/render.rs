//! Receipt renderers
//!
//! Provides table, JSON and CSV output for formatted receipts.

use anyhow::{Context, Result};

use super::table::ReceiptTable;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

/// Receipt renderer
pub struct ReceiptRenderer {
    format: OutputFormat,
}

impl ReceiptRenderer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a formatted receipt
    pub fn render(&self, table: &ReceiptTable) -> Result<String> {
        match self.format {
            OutputFormat::Table => Ok(self.render_table(table)),
            OutputFormat::Json => {
                serde_json::to_string(table).context("Failed to serialize receipt")
            }
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(table).context("Failed to serialize receipt")
            }
            OutputFormat::Csv => self.render_csv(table),
        }
    }

    fn render_table(&self, table: &ReceiptTable) -> String {
        let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();
        for row in &table.rows {
            for (width, cell) in widths.iter_mut().zip(row.cells()) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let inner: usize = widths.iter().sum::<usize>() + 3 * (widths.len() - 1);
        let rule = |left: &str, mid: &str, right: &str| {
            let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("{left}{}{right}\n", segments.join(mid))
        };
        let line = |cells: Vec<&str>| {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .enumerate()
                .map(|(i, (cell, width))| {
                    // Descriptions are left aligned, numbers right aligned.
                    if i == 1 {
                        pad_right(cell, *width)
                    } else {
                        pad_left(cell, *width)
                    }
                })
                .collect();
            format!("│ {} │\n", padded.join(" │ "))
        };

        let mut output = String::new();
        output.push_str(&format!("\n{}\n", table.title));
        output.push_str(&format!("Fecha: {}\n", table.issued_at));
        if let Some(customer) = &table.customer {
            output.push_str(&format!("Cliente: {customer}\n"));
        }

        output.push_str(&rule("┌", "┬", "┐"));
        output.push_str(&line(table.headers.iter().map(String::as_str).collect()));
        output.push_str(&rule("├", "┼", "┤"));
        for row in &table.rows {
            output.push_str(&line(row.cells().to_vec()));
        }
        output.push_str(&rule("├", "┴", "┤"));
        output.push_str(&format!(
            "│ {} │\n",
            pad_left(&format!("TOTAL {}", table.total), inner)
        ));
        output.push_str(&format!("└{}┘\n", "─".repeat(inner + 2)));

        if let Some(method) = &table.payment_method {
            output.push_str(&format!("Forma de pago: {method}\n"));
        }

        output
    }

    fn render_csv(&self, table: &ReceiptTable) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row.cells())?;
        }
        writer.write_record(["", "TOTAL", "", table.total.as_str()])?;

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {e}"))?;
        String::from_utf8(bytes).context("CSV output is not valid UTF-8")
    }
}

fn pad_left(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{text}", " ".repeat(width.saturating_sub(len)))
}

fn pad_right(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{text}{}", " ".repeat(width.saturating_sub(len)))
}
