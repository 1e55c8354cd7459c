//! partyq CLI - Command-line client for shared party queues
//!
//! Every invocation loads the party from the local store, applies one
//! mutation through a queue session and reports any overwritten edits.

mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, PartyCommands};
use crate::commands::{add, completions, list, note, party, queue, renormalize};
use crate::context::CliContext;
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

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("partyq=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return completions::run_completions(*shell, output.as_deref());
    }

    let ctx = CliContext::resolve(cli.db_path, cli.config_path, cli.session_id)?;

    match cli.command {
        Commands::Party { command } => match command {
            PartyCommands::Create { name, display_name } => {
                party::run_create(&ctx, &name, &display_name).await?;
            }
            PartyCommands::Join {
                party,
                display_name,
            } => party::run_join(&ctx, &party, &display_name).await?,
        },
        Commands::Add { party, item } => add::run_add(&ctx, &party, item).await?,
        Commands::List { party, all, json } => list::run_list(&ctx, &party, all, json).await?,
        Commands::Move {
            party,
            item,
            direction,
        } => queue::run_move(&ctx, &party, &item, direction.into()).await?,
        Commands::Delete { party, item } => queue::run_delete(&ctx, &party, &item).await?,
        Commands::Advance { party } => queue::run_advance(&ctx, &party).await?,
        Commands::ShowNext { party, item } => queue::run_show_next(&ctx, &party, &item).await?,
        Commands::EditNote {
            party,
            item,
            content,
        } => note::run_edit_note(&ctx, &party, &item, &content).await?,
        Commands::Toggle { party, item } => note::run_toggle(&ctx, &party, &item).await?,
        Commands::Renormalize { party } => renormalize::run_renormalize(&ctx, &party).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
