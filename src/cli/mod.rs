//! CLI command definitions and parsing
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "reviewscope",
    version,
    author = "neur0map",
    about = "Google Maps review intelligence for brands and places",
    long_about = "Reviewscope finds a brand's listings on Google Maps, scrapes their reviews through \
                  asynchronous scraping jobs, optionally enriches them with AI analysis, and reports \
                  rating distributions, sentiment and recurring keywords."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/reviewscope/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search a brand's listings and scrape their reviews
    Brand {
        /// Brand or business name to search for
        name: String,

        /// City or area appended to the search (e.g., "Milano")
        #[arg(short, long)]
        location: Option<String>,

        /// Maximum number of listings to keep
        #[arg(short = 'm', long)]
        max_places: Option<u32>,

        /// Discovery mode: "balanced" or "aggressive"
        #[arg(long)]
        mode: Option<String>,

        /// Ignore permanently closed listings
        #[arg(long)]
        skip_closed: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Scrape reviews for pasted Google Maps place URLs
    Urls {
        /// Place URLs or place ids, one per argument
        urls: Vec<String>,

        /// Read additional URLs from a file, one per line
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Browse saved runs
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options shared by every scraping command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Maximum reviews scraped per place
    #[arg(long)]
    pub max_reviews: Option<u32>,

    /// Enrich places with AI analysis (needs the analysis API key)
    #[arg(long)]
    pub ai: bool,

    /// Send every text review to the analysis service
    #[arg(long)]
    pub no_sampling: bool,

    /// Comma-separated positions of discovered places to scrape (e.g., "0,2,5")
    #[arg(short, long, value_delimiter = ',')]
    pub select: Option<Vec<usize>>,

    /// Write the run artifact as JSON
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Do not save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Profile to use (e.g., "presale", "full")
    #[arg(short, long)]
    pub profile: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List saved runs, newest first
    List,

    /// Show the summary of a saved run
    Show {
        /// Run id
        id: String,
    },

    /// Write a saved run as JSON
    Export {
        /// Run id
        id: String,

        /// Destination file
        output: PathBuf,
    },

    /// Delete a saved run
    Delete {
        /// Run id
        id: String,
    },

    /// Delete every saved run
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
