//! User command - register users for the scheduled jobs

use anyhow::Result;
use clap::Subcommand;

use nudge_core::User;

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Add (or reactivate) a user
    Add {
        /// User ID
        id: String,
    },
    /// Stop scanning a user in scheduled jobs
    Deactivate {
        /// User ID
        id: String,
    },
    /// List active users
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: UserCommands) -> Result<()> {
    let ctx = get_context()?;
    match command {
        UserCommands::Add { id } => {
            ctx.gateway.upsert_user(&User::new(&id))?;
            output::success(&format!("User {} is active", id));
        }
        UserCommands::Deactivate { id } => {
            ctx.gateway.upsert_user(&User::inactive(&id))?;
            output::success(&format!("User {} deactivated", id));
        }
        UserCommands::List { json } => {
            let users = ctx.gateway.load_active_users()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else if users.is_empty() {
                output::info("No active users.");
            } else {
                for id in users {
                    println!("{}", id);
                }
            }
        }
    }
    Ok(())
}
