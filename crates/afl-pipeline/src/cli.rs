//! Command-line definition

use clap::{Parser, Subcommand, ValueEnum};

/// Where staged files and tables live
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Cloud object storage and the warehouse REST API
    Cloud,
    /// Process-local store and warehouse, for dry runs
    Memory,
}

/// AFL player statistics loader
#[derive(Parser, Debug)]
#[command(name = "afl-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Storage and warehouse backend
    #[arg(long, value_enum, env = "AFL_BACKEND", default_value = "cloud", global = true)]
    pub backend: Backend,

    /// Print the command reference as Markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process several seasons and rebuild the combined table
    Run {
        /// Seasons to process, in order
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        years: Vec<i32>,

        /// Use generated sample data instead of the source feed
        #[arg(long)]
        sample: bool,

        /// Load already-staged objects without fetching or uploading
        #[arg(long)]
        skip_upload: bool,

        /// Do not rebuild the combined table
        #[arg(long)]
        no_combined: bool,
    },

    /// Process a single season
    Year {
        year: i32,

        /// Use generated sample data instead of the source feed
        #[arg(long)]
        sample: bool,

        /// Load the already-staged object without fetching or uploading
        #[arg(long)]
        skip_upload: bool,
    },

    /// Rebuild the combined table from already-loaded seasons
    Combine {
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        years: Vec<i32>,
    },
}
