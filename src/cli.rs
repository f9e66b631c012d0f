use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "strata", version, about = "Render a region-file world into a map tile pyramid")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Keep the tile store in step with the world.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: PathBuf,
    /// Run a single rescan, wait for the queue to drain, then exit.
    #[arg(long)]
    pub once: bool,
    /// Override `worker_count` from the config.
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub verbose: bool,
    /// Stop after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<u64>,
}
