//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// postpilot: schedule posts and publish them to social platforms
#[derive(Parser, Debug)]
#[command(name = "postpilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the publication scheduler
    Run(RunArgs),

    /// Create and inspect scheduled posts
    Post(PostArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Process one scheduler tick synchronously and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct PostArgs {
    #[command(subcommand)]
    pub command: PostCommands,
}

#[derive(Subcommand, Debug)]
pub enum PostCommands {
    /// Schedule a new post
    Add {
        /// Owner (user identifier) of the post
        #[arg(long)]
        owner: String,

        /// Post text content
        #[arg(long)]
        content: String,

        /// Target platform (repeat for multiple)
        #[arg(long = "target", required = true)]
        targets: Vec<String>,

        /// Publication time, RFC 3339 (must be in the future)
        #[arg(long)]
        at: String,

        /// Optional image reference
        #[arg(long)]
        image_url: Option<String>,

        /// Create as a draft instead of scheduling immediately
        #[arg(long)]
        draft: bool,
    },

    /// Move a draft post into the schedule
    Schedule {
        /// Post ID
        #[arg(long)]
        id: String,
    },

    /// Edit a post that has not yet reached a terminal state
    Edit {
        /// Post ID
        #[arg(long)]
        id: String,

        /// Replacement text content
        #[arg(long)]
        content: Option<String>,

        /// Replacement target platform (repeat for multiple)
        #[arg(long = "target")]
        targets: Vec<String>,

        /// New publication time, RFC 3339 (must be in the future)
        #[arg(long)]
        at: Option<String>,
    },

    /// List posts for an owner
    List {
        #[arg(long)]
        owner: String,

        /// Filter by status (draft, scheduled, published, failed)
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the publication attempt history for a post
    Attempts {
        /// Post ID
        #[arg(long)]
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}
