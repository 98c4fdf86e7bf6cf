use clap::{Parser, Subcommand};

use crate::pipeline::RunMode;

/// Multi-stage job market analysis with resumable stage caching.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the pipeline, resuming from cached stages
    Run {
        /// Ignore cached stage outputs and recompute every stage
        #[arg(long)]
        force_new: bool,

        /// Regenerate only the final report from cached analyses
        #[arg(long)]
        report_only: bool,
    },
}

impl Command {
    pub fn run_mode(&self) -> RunMode {
        match self {
            Command::Run {
                force_new,
                report_only,
            } => RunMode {
                force_refresh: *force_new,
                report_only: *report_only,
            },
        }
    }
}
