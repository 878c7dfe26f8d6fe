//! Margin CLI - highlight and annotate study material from the terminal
//!
//! Anchors passages of HTML or text-layer sources, renders them back, and
//! keeps the local replica in step with the remote store.

mod cli;
mod commands;
mod error;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::add::{run_add, AddRequest};
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::export::run_export;
use crate::commands::list::run_list;
use crate::commands::note::run_note;
use crate::commands::render::run_render;
use crate::commands::sync::run_sync;
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
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("margin_cli=info,margin_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    if let Commands::Completions { shell, output } = &command {
        return run_completions(*shell, output.as_deref());
    }

    let ctx = CliContext::resolve(cli.config.as_deref(), cli.db_path, cli.user)?;

    match command {
        Commands::Add {
            material,
            source,
            quote,
            occurrence,
            color,
            question,
            note,
        } => {
            let request = AddRequest {
                material_id: &material,
                source: &source,
                quote_parts: &quote,
                occurrence,
                color: color.into(),
                question_id: question.as_deref(),
                note: note.as_deref(),
            };
            run_add(&ctx, &request).await?;
        }
        Commands::List { material, json } => run_list(&ctx, material.as_deref(), json).await?,
        Commands::Render {
            material,
            source,
            strategy,
            output,
        } => {
            run_render(
                &ctx,
                &material,
                &source,
                strategy.map(Into::into),
                output.as_deref(),
            )
            .await?;
        }
        Commands::Note { id, content, clear } => run_note(&ctx, &id, &content, clear).await?,
        Commands::Delete { id } => run_delete(&ctx, &id).await?,
        Commands::Export {
            format,
            material,
            output,
        } => run_export(&ctx, format, material.as_deref(), output.as_deref()).await?,
        Commands::Sync => run_sync(&ctx).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
