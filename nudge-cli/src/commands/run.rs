//! Run command - execute a scheduled job once

use anyhow::{Context, Result};
use clap::Subcommand;

use super::{get_context, parse_date};
use crate::output;

#[derive(Subcommand)]
pub enum RunCommands {
    /// Encouragement and goal milestones
    Daily {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Weekly spending summaries
    Weekly {
        /// Last day of the week to summarize (YYYY-MM-DD), defaults to today
        #[arg(long)]
        today: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Trigger log retention
    Monthly {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(command: RunCommands) -> Result<()> {
    let ctx = get_context()?;

    let (summary, json) = match command {
        RunCommands::Daily { json } => (ctx.jobs.run_daily().await, json),
        RunCommands::Weekly { today, json } => {
            let summary = match today.as_deref() {
                Some(day) => ctx.jobs.run_weekly_at(parse_date(day)?).await,
                None => ctx.jobs.run_weekly().await,
            };
            (summary, json)
        }
        RunCommands::Monthly { json } => (ctx.jobs.run_monthly().await, json),
    };
    let summary = summary.context("Job could not start")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", output::job_summary_table(&summary));
    if summary.failed > 0 {
        output::warning(&format!("{} users failed; see logs", summary.failed));
    } else {
        output::success(&format!("{} job finished", summary.job));
    }
    Ok(())
}
