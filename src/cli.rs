// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use cutover::types::ImageRef;

#[derive(Parser)]
#[command(name = "cutover")]
#[command(about = "Blue/green traffic shifting for load-balanced container services")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Target destination (defined in config)
    #[arg(short, long, global = true)]
    pub destination: Option<String>,

    /// Break a shift lock held by another process (with init: overwrite cutover.yml)
    #[arg(long, global = true)]
    pub force: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a template cutover.yml
    Init {
        /// Service name (defaults to "web")
        #[arg(short, long)]
        service: Option<String>,
    },

    /// Show what apply would change
    Plan,

    /// Provision or update infrastructure to match cutover.yml
    Apply,

    /// Register a revision with new images and shift traffic to it
    Shift {
        /// Image override as <container>=<image>, repeatable
        #[arg(short, long = "image", value_parser = parse_image_override, required = true)]
        images: Vec<(String, ImageRef)>,
    },

    /// Cut production over to the candidate awaiting approval
    Approve,

    /// Tear down a candidate that has not received production traffic
    Abort,

    /// Return production to the previous revision
    Rollback,

    /// Run the release pipeline for a pushed commit
    Release {
        #[arg(long)]
        commit: String,

        /// Branch that was pushed (defaults to the tracked branch)
        #[arg(long)]
        branch: Option<String>,

        /// Repository that was pushed (defaults to the tracked repository)
        #[arg(long)]
        repository: Option<String>,
    },

    /// Show listener bindings, task sets and the release ledger
    Status,
}

fn parse_image_override(input: &str) -> Result<(String, ImageRef), String> {
    let (container, image) = input
        .split_once('=')
        .ok_or_else(|| format!("expected <container>=<image>, got {input:?}"))?;
    if container.is_empty() {
        return Err(format!("missing container name in {input:?}"));
    }
    let image = ImageRef::parse(image).map_err(|e| e.to_string())?;
    Ok((container.to_string(), image))
}
