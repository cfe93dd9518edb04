//! Shared types for the flomokit application.
//!
//! This module contains the crate-wide `Result` alias and the CLI subcommands.
use std::path::PathBuf;

use clap::Subcommand;

use crate::FlomoError;

/// A specialized Result type for flomokit operations.
pub type Result<T> = std::result::Result<T, FlomoError>;

/// Available subcommands for the flomokit application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every note, print an analysis and export it
    Fetch {
        /// Directory receiving flomo_export.csv and flomo_export.json
        #[clap(short, long, default_value = ".")]
        output: PathBuf,

        /// Stop after this many notes (most recently updated first)
        #[clap(short = 'n', long)]
        limit: Option<usize>,

        /// Only print the analysis, write no files
        #[clap(long)]
        no_export: bool,
    },

    /// Search notes and filter the hits
    Search {
        /// Search query text
        query: String,

        /// Maximum number of hits to fetch
        #[clap(short = 'n', long, default_value_t = 100)]
        max: usize,

        /// Tags every hit must carry (comma-separated)
        #[clap(short, long)]
        include: Option<String>,

        /// Tags no hit may carry (comma-separated)
        #[clap(short, long)]
        exclude: Option<String>,

        /// Keep only hits with attached files
        #[clap(long, conflicts_with = "no_files")]
        with_files: bool,

        /// Keep only hits without attached files
        #[clap(long)]
        no_files: bool,

        /// Earliest creation date, YYYY-MM-DD
        #[clap(long)]
        from: Option<String>,

        /// Latest creation date, YYYY-MM-DD
        #[clap(long)]
        to: Option<String>,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Show the notes the service considers similar to one note
    Recommend {
        /// Slug of the note
        slug: String,

        /// Similarity threshold for "high similarity"
        #[clap(short, long)]
        threshold: Option<f64>,

        /// Leave out notes sharing a tag with this one
        #[clap(long)]
        no_same_tag: bool,
    },

    /// Build a similarity graph around the latest notes and export it
    Graph {
        /// Number of latest notes used as seeds
        #[clap(short, long, default_value_t = 50)]
        sample: usize,

        /// Similarity above which a recommendation becomes an edge
        #[clap(short, long)]
        threshold: Option<f64>,

        /// Leave out notes sharing a tag with the seed
        #[clap(long)]
        no_same_tag: bool,

        /// Output file for the node/edge document
        #[clap(short, long, default_value = "flomo_network.json")]
        output: PathBuf,
    },

    /// List tags and analyze their structure
    Tags {
        /// Also report tags used on recent notes but absent from the tag list
        #[clap(long)]
        check_missing: bool,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Show details of attached files
    Files {
        /// File ids
        #[clap(required = true)]
        ids: Vec<String>,
    },
}
