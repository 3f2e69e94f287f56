//! My FODMAP CLI - track food tolerance from the terminal, backed up to
//! Google Drive.

mod cli;
mod commands;
mod config_profiles;
mod context;
mod error;
mod secret_store;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::category::run_category;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::food::run_food;
use crate::commands::list::run_list;
use crate::commands::reset::run_reset;
use crate::commands::sync::run_sync;
use crate::commands::transfer::{run_export, run_import};
use crate::context::AppContext;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fodmap_core=info,fodmap_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
        Commands::Config { command } => run_config(command, cli.profile.as_deref())?,
        command => {
            let mut ctx = AppContext::from_cli(cli.profile.as_deref(), cli.data_dir, cli.offline)?;
            run_with_context(&mut ctx, command).await?;
        }
    }

    Ok(())
}

async fn run_with_context(ctx: &mut AppContext, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Category { command } => run_category(ctx, command).await,
        Commands::Food { command } => run_food(ctx, command).await,
        Commands::List { category, json } => run_list(ctx, category.as_deref(), json),
        Commands::Export { output } => run_export(ctx, output.as_deref()),
        Commands::Import { path } => run_import(ctx, &path).await,
        Commands::Auth { command } => run_auth(ctx, command).await,
        Commands::Sync { initial } => run_sync(ctx, initial).await,
        Commands::Reset { yes } => run_reset(ctx, yes),
        Commands::Completions { .. } | Commands::Config { .. } => Ok(()),
    }
}
