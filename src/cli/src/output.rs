//! Formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};
use serde_json::{Map, Value};

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Render a document as pretty or single-line JSON.
pub fn render_json(doc: &Map<String, Value>, compact: bool) -> Result<String, serde_json::Error> {
    if compact {
        serde_json::to_string(doc)
    } else {
        serde_json::to_string_pretty(doc)
    }
}

/// Print a document as JSON to stdout.
pub fn print_json(doc: &Map<String, Value>, compact: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_json(doc, compact)?);
    Ok(())
}

/// Format a chrono timestamp as a relative "ago" string.
pub fn format_ago(dt: &chrono::DateTime<chrono::Utc>) -> String {
    let duration = chrono::Utc::now().signed_duration_since(*dt);

    let secs = duration.num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }
    if secs < 60 {
        return format!("{secs} seconds ago");
    }

    let mins = duration.num_minutes();
    if mins < 60 {
        return format!("{mins} minutes ago");
    }

    let hours = duration.num_hours();
    if hours < 24 {
        return format!("{hours} hours ago");
    }

    let days = duration.num_days();
    if days < 365 {
        return format!("{days} days ago");
    }

    format!("{} years ago", days / 365)
}
