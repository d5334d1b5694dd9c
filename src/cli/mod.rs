pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::Result;

#[derive(Parser)]
#[command(name = "feedsift")]
#[command(about = "A rule-driven automation pipeline for RSS/Atom feeds")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute configured tasks
    Run {
        /// Specific task name (if not provided, run all)
        task: Option<String>,

        /// Execute without persisting the session or writing outputs
        #[arg(long)]
        test: bool,

        /// Skip download/output but still run filters, marking entries seen
        #[arg(long)]
        learn: bool,
    },

    /// List configured tasks
    Tasks,

    /// List registered plugins
    Plugins,

    /// Show recently failed entries
    Failed {
        /// Clear the failed list instead of showing it
        #[arg(long)]
        clear: bool,
    },

    /// Initialize feedsift configuration
    Init,

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Initialize logging
        commands::init_logging(self.debug, self.verbose)?;

        match self.command {
            Commands::Run { task, test, learn } => {
                commands::run(task, test, learn, self.config).await
            }
            Commands::Tasks => {
                commands::list_tasks(self.config)
            }
            Commands::Plugins => {
                commands::list_plugins(self.config)
            }
            Commands::Failed { clear } => {
                commands::failed(clear, self.config)
            }
            Commands::Init => {
                commands::init(self.config)
            }
            Commands::Completions { shell } => {
                commands::generate_completions(shell);
                Ok(())
            }
        }
    }
}
