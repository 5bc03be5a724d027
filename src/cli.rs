use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Listings CSV. Overrides `listings_path` from config.yaml
    #[clap(long, global = true)]
    pub listings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate cli docs in markdown format
    #[cfg(feature = "markdown-docs")]
    #[clap(hide = true)]
    MarkdownDocs {},

    /// Start the recommendation web service.
    Daemon {
        /// Address to listen on. Overrides `server.addr` from config.yaml
        #[clap(long)]
        addr: Option<String>,
    },

    /// Recommend a listing for one buyer preference and print it as JSON
    Recommend {
        /// Free-text buyer preference
        preference: String,
    },

    /// Build the listing index (and embedding cache) and report its size
    Index {},
}
