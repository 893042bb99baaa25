//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};

use nudge_core::services::JobSummary;
use nudge_core::NotificationTrigger;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Compact `key=value` rendering of a trigger payload
pub fn format_data(trigger: &NotificationTrigger) -> String {
    trigger
        .data
        .iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Table of triggers, newest first
pub fn trigger_table(triggers: &[NotificationTrigger]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Time", "User", "Type", "Template", "Source", "Data"]);
    for trigger in triggers {
        table.add_row(vec![
            trigger.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            trigger.user_id.clone(),
            trigger.trigger_type.to_string(),
            trigger.template_key.clone(),
            trigger.source.as_str().to_string(),
            format_data(trigger),
        ]);
    }
    table
}

/// Vertical key/value table for a job run
pub fn job_summary_table(summary: &JobSummary) -> Table {
    let mut table = create_table();
    table.add_row(vec!["Job".to_string(), summary.job.to_string()]);
    table.add_row(vec!["Users".to_string(), summary.users.to_string()]);
    table.add_row(vec!["Succeeded".to_string(), summary.succeeded.to_string()]);
    table.add_row(vec!["Skipped".to_string(), summary.skipped.to_string()]);
    table.add_row(vec!["Failed".to_string(), summary.failed.to_string()]);
    table.add_row(vec!["Triggers".to_string(), summary.triggers_emitted.to_string()]);
    table.add_row(vec!["Deleted".to_string(), summary.deleted.to_string()]);
    table
}
