//! Budget command - per-category monthly limits

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::{get_context, parse_amount};
use crate::output;

#[derive(Subcommand)]
pub enum BudgetCommands {
    /// Set the monthly limit for a category
    Set {
        /// User ID
        #[arg(long)]
        user: String,
        /// Category
        #[arg(long)]
        category: String,
        /// Monthly limit (0 removes the limit)
        #[arg(long)]
        limit: String,
    },
    /// Show a user's budget
    Show {
        /// User ID
        #[arg(long)]
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: BudgetCommands) -> Result<()> {
    let ctx = get_context()?;
    match command {
        BudgetCommands::Set {
            user,
            category,
            limit,
        } => {
            let limit = parse_amount(&limit)?;
            if limit.is_sign_negative() {
                anyhow::bail!("Limit cannot be negative: {}", limit);
            }
            let mut budget = ctx.gateway.load_budget(&user)?.unwrap_or_default();
            budget.set_limit(&category, limit);
            ctx.gateway.put_budget(&user, &budget)?;
            output::success(&format!("Budget for {} / {} set to {}", user, category, limit));
        }
        BudgetCommands::Show { user, json } => {
            let budget = ctx.gateway.load_budget(&user)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&budget)?);
                return Ok(());
            }
            let Some(budget) = budget else {
                output::info(&format!("No budget configured for {}", user));
                return Ok(());
            };

            let mut categories: Vec<_> = budget.categories.iter().collect();
            categories.sort_by(|a, b| a.0.cmp(b.0));

            println!("{}", format!("Budget for {}", user).bold());
            let mut table = output::create_table();
            table.set_header(vec!["Category", "Limit"]);
            for (category, limit) in categories {
                table.add_row(vec![category.clone(), limit.limit.to_string()]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}
