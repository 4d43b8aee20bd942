//! Output formatting utilities for the CLI
//!
//! Tables for stage progress and event checks, the composite result as
//! pretty JSON, and colored status messages.

use crossterm::style::Color;
use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use fa_core::EventAccess;
use fa_orchestrator::{CompositeResult, StatusView};

/// Format the stage list of a status view as a table
pub fn format_stages(view: &StatusView) -> String {
    #[derive(Tabled)]
    struct StageRow {
        #[tabled(rename = "STAGE")]
        label: &'static str,
        #[tabled(rename = "STATUS")]
        text: &'static str,
    }

    let rows: Vec<StageRow> = view
        .stages
        .iter()
        .map(|line| StageRow {
            label: line.label,
            text: line.text,
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the composite result as pretty JSON, summary first
pub fn format_composite(composite: &CompositeResult) -> serde_json::Result<String> {
    let mut output = String::new();
    if let Some(summary) = &composite.summary {
        output.push_str(summary);
        output.push_str("\n\n");
    }
    output.push_str(&serde_json::to_string_pretty(composite)?);
    Ok(output)
}

/// Format an event check result
pub fn format_event(event_id: &str, access: &EventAccess) -> String {
    #[derive(Tabled)]
    struct EventRow {
        #[tabled(rename = "EVENT")]
        id: String,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "OPEN")]
        open: &'static str,
        #[tabled(rename = "MESSAGE")]
        message: String,
    }

    let row = EventRow {
        id: event_id.to_string(),
        name: access.event_name.clone().unwrap_or_else(|| "-".to_string()),
        open: if access.is_accessible { "yes" } else { "no" },
        message: access.message.clone().unwrap_or_else(|| "-".to_string()),
    };

    Table::new([row])
        .with(Style::rounded())
        .with(Width::wrap(100))
        .to_string()
}

fn print_tagged(mut out: impl std::io::Write, color: Color, tag: &str, msg: &str) {
    use crossterm::style::{Print, ResetColor, SetForegroundColor};

    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(tag),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_tagged(std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    print_tagged(std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    print_tagged(std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_tagged(std::io::stdout(), Color::Cyan, "ℹ ", msg);
}
