//! Goal command - savings goals and progress signals

use anyhow::Result;
use clap::Subcommand;

use nudge_core::{Goal, GoalSignals};

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Add a goal
    Add {
        /// User ID
        #[arg(long)]
        user: String,
        /// Goal name
        #[arg(long)]
        name: String,
        /// Record the goal as already completed
        #[arg(long)]
        completed: bool,
    },
    /// Mark an existing goal completed
    Complete {
        /// User ID
        #[arg(long)]
        user: String,
        /// Goal ID
        #[arg(long)]
        id: String,
    },
    /// Record achievement and streak signals
    Signals {
        /// User ID
        #[arg(long)]
        user: String,
        /// Recently achieved goal names
        #[arg(long = "achievement")]
        achievements: Vec<String>,
        /// Current streak length in days
        #[arg(long, default_value = "0")]
        streak: u32,
    },
    /// List a user's goals
    List {
        /// User ID
        #[arg(long)]
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: GoalCommands) -> Result<()> {
    let ctx = get_context()?;
    match command {
        GoalCommands::Add {
            user,
            name,
            completed,
        } => {
            let mut goal = Goal::new(&user, &name);
            if completed {
                goal = goal.complete();
            }
            ctx.gateway.upsert_goal(&goal)?;
            output::success(&format!("Goal {} added ({})", goal.goal_id, goal.status.as_str()));
        }
        GoalCommands::Complete { user, id } => {
            let goal = ctx
                .gateway
                .load_goals(&user)?
                .into_iter()
                .find(|g| g.goal_id == id)
                .ok_or_else(|| anyhow::anyhow!("Goal not found: {}", id))?;
            ctx.gateway.upsert_goal(&goal.complete())?;
            output::success(&format!("Goal {} completed", id));
        }
        GoalCommands::Signals {
            user,
            achievements,
            streak,
        } => {
            let signals = GoalSignals {
                recent_achievements: achievements,
                current_streak_days: streak,
            };
            ctx.gateway.put_goal_signals(&user, &signals)?;
            output::success(&format!("Signals saved for {}", user));
        }
        GoalCommands::List { user, json } => {
            let goals = ctx.gateway.load_goals(&user)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&goals)?);
                return Ok(());
            }
            if goals.is_empty() {
                output::info(&format!("No goals for {}", user));
                return Ok(());
            }
            let mut table = output::create_table();
            table.set_header(vec!["ID", "Name", "Status", "Celebrated"]);
            for goal in goals {
                table.add_row(vec![
                    goal.goal_id,
                    goal.name,
                    goal.status.as_str().to_string(),
                    goal.celebration_sent.to_string(),
                ]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}
