//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Watch paths for changes and wait for synced files to download
#[derive(Parser)]
#[command(
    name = "pathwatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch paths for changes and wait for synced files to download",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  pathwatch init\n  pathwatch watch ./notes\n  pathwatch watch ./notes --json\n  pathwatch download ./report.pdf\n  pathwatch ls ./notes --recursive --ext md"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .pathwatch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    #[command(about = "Display active settings")]
    Config,

    /// Watch a file or directory until interrupted
    #[command(about = "Print a line for every change to a path (Ctrl-C to stop)")]
    Watch {
        /// File or directory to observe
        path: PathBuf,

        /// Report changes to subitems of a directory
        #[arg(long, overrides_with = "no_recursive")]
        recursive: bool,

        /// Only report changes to the path itself (overrides config)
        #[arg(long)]
        no_recursive: bool,

        /// Emit one JSON object per change
        #[arg(long)]
        json: bool,
    },

    /// Wait until a file is downloaded
    #[command(about = "Request a synced file and wait until it is local")]
    Download {
        /// File to download
        path: PathBuf,

        /// Skip the request when the file is already local
        #[arg(long)]
        if_needed: bool,
    },

    /// List the children of a directory
    #[command(about = "List directory contents as normalized paths")]
    Ls {
        /// Directory to list
        path: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Only show files with this extension (without the dot)
        #[arg(long, value_name = "EXT")]
        ext: Option<String>,
    },
}

impl Commands {
    /// Recursive flag for `watch`: `None` defers to config.
    pub fn watch_recursive(recursive: bool, no_recursive: bool) -> Option<bool> {
        match (recursive, no_recursive) {
            (_, true) => Some(false),
            (true, false) => Some(true),
            (false, false) => None,
        }
    }
}
