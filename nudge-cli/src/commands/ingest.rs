//! Ingest command - store a transaction and run the dispatcher on it

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use nudge_core::services::DispatchCounts;
use nudge_core::{NotificationTrigger, Transaction};

use super::{get_context, parse_amount, parse_date};
use crate::output;

pub struct IngestArgs {
    pub user: String,
    pub amount: String,
    pub category: String,
    pub merchant: String,
    pub date: Option<String>,
    pub description: Option<String>,
    pub json: bool,
}

#[derive(Serialize)]
struct IngestOutput<'a> {
    transaction: &'a Transaction,
    counts: DispatchCounts,
    triggers: Vec<&'a NotificationTrigger>,
    skipped: Vec<String>,
}

pub async fn run(args: IngestArgs) -> Result<()> {
    let ctx = get_context()?;

    let amount = parse_amount(&args.amount)?;
    let date = match args.date.as_deref() {
        Some(d) => parse_date(d)?,
        None => Utc::now().date_naive(),
    };

    let mut tx = Transaction::new(&args.user, date, amount, &args.category, &args.merchant);
    if let Some(description) = args.description {
        tx = tx.with_description(description);
    }
    ctx.gateway.insert_transaction(&tx)?;

    let report = ctx.dispatcher.on_transaction_created(&tx).await;
    let counts = report.counts();
    let skipped: Vec<String> = report
        .results
        .iter()
        .filter_map(|(kind, result)| {
            result
                .as_ref()
                .err()
                .map(|reason| format!("{}: {}", kind.as_str(), reason))
        })
        .collect();

    if args.json {
        let out = IngestOutput {
            transaction: &tx,
            counts,
            triggers: report.triggers().collect(),
            skipped,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    output::success(&format!(
        "Recorded {} {} at {} ({})",
        tx.amount, tx.category, tx.merchant, tx.date
    ));

    let triggers: Vec<NotificationTrigger> = report.triggers().cloned().collect();
    if triggers.is_empty() {
        output::info("No notifications triggered.");
    } else {
        println!("{}", "Triggered".bold());
        println!("{}", output::trigger_table(&triggers));
    }

    for line in &skipped {
        println!("  {}", line.dimmed());
    }
    if counts.failed > 0 {
        output::warning(&format!("{} analyses failed; see logs", counts.failed));
    }

    Ok(())
}
