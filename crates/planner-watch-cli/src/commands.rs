use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "planner-watch")]
#[command(about = "Watches a drop folder and digitizes scanned planner pages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch the configured folder and process each batch after the quiet period
    Run {
        /// Don't process files already sitting in the folder at startup
        #[arg(long)]
        skip_existing: bool,
    },
    /// Process the given files as a single batch and exit
    Process {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Report missing days between the given dates and the existing index
    Gaps {
        #[arg(required = true)]
        dates: Vec<String>,
    },
    /// Check that configured programs and folders are usable
    CheckEnv,
    /// Print configuration values
    PrintConfig,
}
