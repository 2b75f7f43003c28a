// ABOUTME: Entry point for the cutover CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Workspace;
use cutover::config;
use cutover::error::Result;
use cutover::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    if let Err(e) = run(cli, Output::new(mode)).await {
        Output::new(mode).error(&e.to_string());
        // Fatal errors get their own exit code so automation can page.
        std::process::exit(if e.is_fatal() { 2 } else { 1 });
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let destination = cli.destination.as_deref();
    let force = cli.force;

    match cli.command {
        Commands::Init { service } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, service.as_deref(), force)?;
            output.success(&format!("Wrote {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Plan => commands::plan(Workspace::load(destination, force)?, output).await,
        Commands::Apply => commands::apply(Workspace::load(destination, force)?, output).await,
        Commands::Shift { images } => {
            commands::shift(Workspace::load(destination, force)?, images, output).await
        }
        Commands::Approve => commands::approve(Workspace::load(destination, force)?, output).await,
        Commands::Abort => commands::abort(Workspace::load(destination, force)?, output).await,
        Commands::Rollback => {
            commands::rollback(Workspace::load(destination, force)?, output).await
        }
        Commands::Release {
            commit,
            branch,
            repository,
        } => {
            let workspace = Workspace::load(destination, force)?;
            commands::release(workspace, commit, branch, repository, output).await
        }
        Commands::Status => commands::status(Workspace::load(destination, force)?, output).await,
    }
}
