//! Nudge CLI - spending alerts from the terminal

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod commands;
mod output;

use commands::{budget, goal, ingest, prefs, run, triggers, user};

/// Nudge - transaction-triggered spending alerts
#[derive(Parser)]
#[command(name = "nudge", version, about, long_about = None)]
struct Cli {
    /// Emit diagnostics as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users scanned by the scheduled jobs
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// Manage category budgets
    Budget {
        #[command(subcommand)]
        command: budget::BudgetCommands,
    },

    /// Manage notification preferences
    Prefs {
        #[command(subcommand)]
        command: prefs::PrefsCommands,
    },

    /// Manage savings goals
    Goal {
        #[command(subcommand)]
        command: goal::GoalCommands,
    },

    /// Record a transaction and analyze it
    Ingest {
        /// User ID
        #[arg(long)]
        user: String,
        /// Amount (positive = spend)
        #[arg(long, allow_hyphen_values = true)]
        amount: String,
        /// Category
        #[arg(long)]
        category: String,
        /// Merchant name
        #[arg(long)]
        merchant: String,
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Free-text description
        #[arg(long)]
        description: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a scheduled job once
    Run {
        #[command(subcommand)]
        job: run::RunCommands,
    },

    /// Show recorded notification triggers
    Triggers {
        /// Only this user
        #[arg(long)]
        user: Option<String>,
        /// Number of triggers to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    // try_init: a subscriber may already be installed when embedded
    if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .with_filter(env_filter);
        let _ = tracing_subscriber::registry().with(layer).try_init();
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_target(false)
            .with_filter(env_filter);
        let _ = tracing_subscriber::registry().with(layer).try_init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let result = execute(cli.command).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::User { command } => user::run(command),
        Commands::Budget { command } => budget::run(command),
        Commands::Prefs { command } => prefs::run(command),
        Commands::Goal { command } => goal::run(command),
        Commands::Ingest {
            user,
            amount,
            category,
            merchant,
            date,
            description,
            json,
        } => {
            ingest::run(ingest::IngestArgs {
                user,
                amount,
                category,
                merchant,
                date,
                description,
                json,
            })
            .await
        }
        Commands::Run { job } => run::run(job).await,
        Commands::Triggers { user, limit, json } => triggers::run(user.as_deref(), limit, json),
    }
}
