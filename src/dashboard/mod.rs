//! Static HTML report over the persisted dwell totals.
//!
//! The page is one self-contained file: the records are embedded as a JSON
//! array and rendered client-side into a sortable table, a bar chart of every
//! identity, and a top-5 chart.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::{helpers::format_timestamp, ProductivityRecord};

const TEMPLATE: &str = include_str!("template.html");
const DATA_PLACEHOLDER: &str = "__DASHBOARD_DATA__";
const GENERATED_PLACEHOLDER: &str = "__GENERATED_AT__";

/// Number of identities in the ranking chart.
pub const TOP_N: usize = 5;

/// `HH:MM:SS`, hours unbounded.
pub fn format_hms(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// One entry of the embedded data array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRow {
    pub id: u64,
    pub time_spent: String,
    pub time_spent_seconds: u64,
    pub timestamp: String,
}

impl From<&ProductivityRecord> for DashboardRow {
    fn from(record: &ProductivityRecord) -> Self {
        Self {
            id: record.person_id.0,
            time_spent: format_hms(record.time_spent_seconds),
            time_spent_seconds: record.time_spent_seconds,
            timestamp: format_timestamp(&record.last_updated),
        }
    }
}

pub fn dashboard_rows(records: &[ProductivityRecord]) -> Vec<DashboardRow> {
    records.iter().map(DashboardRow::from).collect()
}

/// Highest totals first; ties keep identity order.
pub fn top_rows(rows: &[DashboardRow], n: usize) -> Vec<DashboardRow> {
    let mut ranked = rows.to_vec();
    ranked.sort_by(|a, b| b.time_spent_seconds.cmp(&a.time_spent_seconds));
    ranked.truncate(n);
    ranked
}

// `</` inside a string literal would still end the surrounding <script>.
fn embed_json(rows: &[DashboardRow]) -> Result<String> {
    let json = serde_json::to_string(rows).context("failed to serialize dashboard data")?;
    Ok(json.replace("</", "<\\/"))
}

pub fn render_html(records: &[ProductivityRecord], generated_at: &NaiveDateTime) -> Result<String> {
    let data = embed_json(&dashboard_rows(records))?;
    Ok(TEMPLATE
        .replace(GENERATED_PLACEHOLDER, &format_timestamp(generated_at))
        .replace(DATA_PLACEHOLDER, &data))
}

pub fn write_dashboard(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dashboard directory {}", parent.display()))?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write dashboard to {}", path.display()))
}

/// Plain-text rendering of the same data for the terminal.
pub fn render_text(records: &[ProductivityRecord]) -> String {
    let rows = dashboard_rows(records);
    if rows.is_empty() {
        return "No productivity records yet.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!("{:>8}  {:>10}  {:<19}\n", "ID", "Time Spent", "Timestamp"));
    for row in &rows {
        out.push_str(&format!(
            "{:>8}  {:>10}  {:<19}\n",
            row.id, row.time_spent, row.timestamp
        ));
    }

    out.push_str(&format!("\nTop {TOP_N}:\n"));
    for (rank, row) in top_rows(&rows, TOP_N).iter().enumerate() {
        out.push_str(&format!(
            "{:>2}. Person {:<6} {}\n",
            rank + 1,
            row.id,
            row.time_spent
        ));
    }
    out
}
