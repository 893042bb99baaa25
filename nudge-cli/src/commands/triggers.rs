//! Triggers command - inspect the notification trigger log

use anyhow::Result;

use super::get_context;
use crate::output;

pub fn run(user: Option<&str>, limit: usize, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let triggers = ctx.gateway.load_recent_triggers(user, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&triggers)?);
        return Ok(());
    }

    if triggers.is_empty() {
        output::info("No triggers recorded.");
        return Ok(());
    }

    println!("{}", output::trigger_table(&triggers));
    Ok(())
}
