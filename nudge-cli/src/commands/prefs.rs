//! Prefs command - notification preferences

use anyhow::Result;
use clap::Subcommand;

use nudge_core::domain::{TypeSetting, UserPreferences};
use nudge_core::TriggerType;

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Turn notifications on, optionally enabling specific types
    Set {
        /// User ID
        #[arg(long)]
        user: String,
        /// Notification types to enable (e.g. encouragement, weekly_summary)
        #[arg(long = "type", value_delimiter = ',')]
        types: Vec<String>,
        /// Turn all notifications off instead
        #[arg(long)]
        off: bool,
    },
    /// Show a user's preferences
    Show {
        /// User ID
        #[arg(long)]
        user: String,
    },
}

pub fn run(command: PrefsCommands) -> Result<()> {
    let ctx = get_context()?;
    match command {
        PrefsCommands::Set { user, types, off } => {
            for t in &types {
                if TriggerType::parse(t).is_none() {
                    anyhow::bail!("Unknown notification type: {}", t);
                }
            }

            let mut prefs: UserPreferences = ctx.gateway.load_preferences(&user)?.unwrap_or_default();
            prefs.notifications.enabled = !off;
            for t in types {
                prefs
                    .notifications
                    .types
                    .insert(t, TypeSetting { enabled: true });
            }
            ctx.gateway.put_preferences(&user, &prefs)?;

            if off {
                output::warning(&format!("Notifications off for {}", user));
            } else {
                output::success(&format!("Preferences saved for {}", user));
            }
        }
        PrefsCommands::Show { user } => {
            let prefs = ctx.gateway.load_preferences(&user)?;
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
    }
    Ok(())
}
