//! CLI interface for nbstore.
//!
//! Provides command-line argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line interface for nbstore.
#[derive(Parser)]
#[command(name = "nbstore")]
#[command(author, version, about = "Notebook storage on a flat object store", long_about = None)]
pub struct Cli {
    /// Config file to use instead of $NBSTORE_CONFIG or the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// List every stored notebook id with its last-modified time.
    List,

    /// List notebook ids with their display names, sorted by name.
    Names,

    /// Show a notebook's model as JSON.
    Show {
        /// Notebook id.
        id: String,

        /// Include the notebook content.
        #[arg(short, long)]
        content: bool,
    },

    /// Save notebook JSON under an id, creating or replacing it.
    Save {
        /// Notebook id.
        id: String,

        /// Read the notebook from a file instead of stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Store a named notebook and print its id (generated unless given).
    Import {
        /// Use this id instead of generating one from the notebook name.
        #[arg(long)]
        id: Option<String>,

        /// Read the notebook from a file instead of stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print a stored notebook as canonical JSON.
    Export {
        /// Notebook id.
        id: String,
    },

    /// Move a notebook to a new id.
    Rename {
        /// Current id.
        from: String,
        /// New id.
        to: String,
    },

    /// Delete a notebook. Deleting a missing id succeeds.
    Delete {
        /// Notebook id.
        id: String,
    },

    /// Exit with status 0 if the notebook exists, 1 otherwise.
    Exists {
        /// Notebook id.
        id: String,
    },

    /// Describe the configured store.
    Info,

    /// Create the configured bucket if it does not exist.
    Init,
}
